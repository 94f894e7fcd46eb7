use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error};

use crate::{device::DeviceId, error::Result};

use super::{
    aggregate::{DailyAggregate, Metric},
    stats::{compute_rolling_stats, RollingStats},
};

/// In-memory history of every known day, keyed by day.
///
/// Local increments always go to the entry of the day passed in as "today", while any entry
/// can receive remote data. Days touched since the last save are remembered as dirty.
pub struct HistoryStore {
    device: DeviceId,
    days: BTreeMap<NaiveDate, DailyAggregate>,
    dirty: BTreeSet<NaiveDate>,
}

impl HistoryStore {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            days: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    fn entry(&mut self, day: NaiveDate, now: DateTime<Utc>) -> &mut DailyAggregate {
        self.days
            .entry(day)
            .or_insert_with(|| DailyAggregate::new(day, now))
    }

    pub fn record_increment(
        &mut self,
        today: NaiveDate,
        metric: Metric,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let device = self.device.clone();
        self.entry(today, now)
            .increment(&device, metric, amount, now)?;
        self.dirty.insert(today);
        Ok(())
    }

    pub fn record_distance(
        &mut self,
        today: NaiveDate,
        pixels: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let device = self.device.clone();
        self.entry(today, now)
            .increment_distance(&device, pixels, now)?;
        self.dirty.insert(today);
        Ok(())
    }

    /// Folds a day read back from this device's own storage. Doesn't mark anything dirty.
    pub fn load_local_day(&mut self, aggregate: DailyAggregate) {
        self.merge_day(aggregate);
    }

    /// Folds a day observed on the remote channel. The day becomes dirty only if the remote
    /// copy contained something new, so echoes of our own writes don't trigger saves.
    pub fn merge_remote_day(&mut self, remote: DailyAggregate) -> bool {
        let day = remote.day();
        let changed = self.merge_day(remote);
        if changed {
            self.dirty.insert(day);
        }
        changed
    }

    fn merge_day(&mut self, incoming: DailyAggregate) -> bool {
        let day = incoming.day();
        match self.days.get_mut(&day) {
            None => {
                debug!("Adopting day {day}");
                self.days.insert(day, incoming);
                true
            }
            Some(existing) => match existing.merge(&incoming) {
                Ok(changed) => changed,
                Err(e) => {
                    debug_assert!(false, "day keyed merge failed {e}");
                    error!("Rejected merge of day {day}: {e}");
                    false
                }
            },
        }
    }

    pub fn day(&self, day: NaiveDate) -> Option<&DailyAggregate> {
        self.days.get(&day)
    }

    pub fn all_days(&self) -> impl DoubleEndedIterator<Item = &DailyAggregate> {
        self.days.values()
    }

    pub fn compute_rolling_stats(&self, today: NaiveDate) -> RollingStats {
        compute_rolling_stats(&self.days, today)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Copies of every day that changed since it was last saved.
    pub fn dirty_days(&self) -> Vec<DailyAggregate> {
        self.dirty
            .iter()
            .filter_map(|day| self.days.get(day))
            .cloned()
            .collect()
    }

    /// Marks `saved` as persisted, unless the day moved on since the copy was taken.
    pub fn mark_saved(&mut self, saved: &DailyAggregate) {
        if self.days.get(&saved.day()) == Some(saved) {
            self.dirty.remove(&saved.day());
        }
    }
}
