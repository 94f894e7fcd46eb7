//!  History is organized around [store::HistoryStore].
//!  The basic idea is:
//!   - Every calendar day has one [aggregate::DailyAggregate] shared by all devices.
//!   - Each device only ever raises its own slot of a day, so copies of a day can be merged in
//!     any order.
//!   - Rolling statistics are pure functions over the merged days.

pub mod aggregate;
pub mod stats;
pub mod store;

pub use aggregate::{DailyAggregate, DayTotals, Metric};
pub use stats::{Measure, MeasureStats, RollingStats};
pub use store::HistoryStore;
