//! Per-day activity counters (keystrokes, words, clicks, scrolls, mouse travel) that are
//! recorded independently on every device of a user and converge through a shared sync
//! channel. Counters are grow-only CRDTs, so snapshots can be exchanged in any order, any
//! number of times, without a coordinator.
//!

pub mod cli;
pub mod crdt;
pub mod daemon;
pub mod device;
pub mod error;
pub mod fs;
pub mod history;
pub mod utils;
