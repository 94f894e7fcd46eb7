//!  Storage is organized through two narrow capabilities.
//!  The basic idea is:
//!   - [LocalStore] keeps this device's copy of every day, see [local::FileHistoryStore].
//!   - [RemoteStore] is the shared, size limited channel all devices publish their merged days
//!     to, see [remote::SharedDirRemote].
//!   - Both only persist what they are handed; merging is done by the reconciler.

pub mod local;
pub mod memory;
pub mod remote;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::{error::Result, history::DailyAggregate};

pub type DayMap = BTreeMap<NaiveDate, DailyAggregate>;

/// Durable storage of this device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load_all(&self) -> Result<DayMap>;

    async fn save(&self, aggregate: &DailyAggregate) -> Result<()>;
}

/// Eventually consistent channel shared by every device of the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Best effort snapshot of what is currently stored remotely.
    async fn load_all(&self) -> Result<DayMap>;

    /// Upserts this device's fully merged view of a day.
    async fn save(&self, aggregate: &DailyAggregate) -> Result<()>;

    /// Stream of days changed by other devices. Delivery is at least once and may batch
    /// several days. The stream ends once `shutdown` is cancelled.
    fn observe_changes(
        &self,
        shutdown: CancellationToken,
    ) -> BoxStream<'static, Vec<DailyAggregate>>;
}

/// Merges every aggregate of `days` into a map keyed by day.
pub(crate) fn collect_days(days: impl IntoIterator<Item = DailyAggregate>) -> DayMap {
    let mut map = DayMap::new();
    for aggregate in days {
        match map.get_mut(&aggregate.day()) {
            Some(existing) => {
                // Same day key, so the merge can't fail.
                let _ = existing.merge(&aggregate);
            }
            None => {
                map.insert(aggregate.day(), aggregate);
            }
        }
    }
    map
}
