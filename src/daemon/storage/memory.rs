//! In-process stores. Used to run several devices against each other inside one process.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::{error::Result, history::DailyAggregate};

use super::{DayMap, LocalStore, RemoteStore};

/// Local store keeping days in memory. Counts the writes it receives.
#[derive(Clone, Default)]
pub struct MemoryLocal {
    days: Arc<Mutex<DayMap>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryLocal {
    pub fn with_days(days: impl IntoIterator<Item = DailyAggregate>) -> Self {
        let store = Self::default();
        store
            .days
            .lock()
            .extend(days.into_iter().map(|v| (v.day(), v)));
        store
    }

    pub fn days(&self) -> DayMap {
        self.days.lock().clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl LocalStore for MemoryLocal {
    async fn load_all(&self) -> Result<DayMap> {
        Ok(self.days())
    }

    async fn save(&self, aggregate: &DailyAggregate) -> Result<()> {
        self.days.lock().insert(aggregate.day(), aggregate.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Remote channel shared by clones. Saves are joined into the stored day and every stored
/// result is broadcast to all observers, the saving device included.
#[derive(Clone)]
pub struct MemoryRemote {
    days: Arc<Mutex<DayMap>>,
    changes: broadcast::Sender<Vec<DailyAggregate>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            days: Default::default(),
            changes,
        }
    }
}

impl MemoryRemote {
    pub fn days(&self) -> DayMap {
        self.days.lock().clone()
    }

    /// Delivers `days` to observers without storing them, like a transport re-sending an
    /// update it already delivered.
    pub fn redeliver(&self, days: Vec<DailyAggregate>) {
        let _ = self.changes.send(days);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn load_all(&self) -> Result<DayMap> {
        Ok(self.days())
    }

    async fn save(&self, aggregate: &DailyAggregate) -> Result<()> {
        let stored = {
            let mut days = self.days.lock();
            let stored = days
                .entry(aggregate.day())
                .or_insert_with(|| aggregate.clone());
            stored.merge(aggregate)?;
            stored.clone()
        };
        let _ = self.changes.send(vec![stored]);
        Ok(())
    }

    fn observe_changes(
        &self,
        shutdown: CancellationToken,
    ) -> BoxStream<'static, Vec<DailyAggregate>> {
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(|v| future::ready(v.ok()))
            .take_until(shutdown.cancelled_owned())
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::storage::{LocalStore, RemoteStore},
        device::DeviceId,
        history::{DailyAggregate, Metric},
    };

    use super::{MemoryLocal, MemoryRemote};

    fn aggregate(device: &str, keystrokes: u64) -> DailyAggregate {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap();
        let mut aggregate =
            DailyAggregate::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), now);
        aggregate
            .increment(&DeviceId::new(device), Metric::Clicks, keystrokes, now)
            .unwrap();
        aggregate
    }

    #[tokio::test]
    async fn test_remote_broadcasts_joined_day() -> Result<()> {
        let remote = MemoryRemote::default();
        let shutdown = CancellationToken::new();
        let mut changes = remote.observe_changes(shutdown.clone());

        remote.save(&aggregate("a", 3)).await?;
        remote.save(&aggregate("b", 4)).await?;

        assert_eq!(changes.next().await.unwrap()[0].total(Metric::Clicks), 3);
        assert_eq!(changes.next().await.unwrap()[0].total(Metric::Clicks), 7);

        shutdown.cancel();
        assert!(changes.next().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_counts_writes() -> Result<()> {
        let local = MemoryLocal::default();

        local.save(&aggregate("a", 1)).await?;
        local.save(&aggregate("a", 2)).await?;

        assert_eq!(local.writes(), 2);
        assert_eq!(local.load_all().await?.len(), 1);
        Ok(())
    }
}
