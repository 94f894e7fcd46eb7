//! Replicated data types. Everything here is merged with a join: merging is commutative,
//! associative and idempotent, which is what lets snapshots travel through an unreliable sync
//! channel.

pub mod counter;

pub use counter::GrowOnlyCounter;
