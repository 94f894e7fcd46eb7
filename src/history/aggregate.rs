use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    crdt::GrowOnlyCounter,
    device::DeviceId,
    error::{Result, TallyError},
};

/// Mouse travel is kept in thousandths of a pixel so it can live in a [GrowOnlyCounter].
pub const MILLIPIXELS_PER_PIXEL: f64 = 1000.;

/// Integer activity counters tracked per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Keystrokes,
    Words,
    Clicks,
    Scrolls,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Keystrokes,
        Metric::Words,
        Metric::Clicks,
        Metric::Scrolls,
    ];
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Keystrokes => write!(f, "keystrokes"),
            Metric::Words => write!(f, "words"),
            Metric::Clicks => write!(f, "clicks"),
            Metric::Scrolls => write!(f, "scrolls"),
        }
    }
}

/// Totals of a single day summed over every device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayTotals {
    pub keystrokes: u64,
    pub words: u64,
    pub clicks: u64,
    pub scrolls: u64,
    /// Pixels.
    pub distance: f64,
}

impl DayTotals {
    pub fn count(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Keystrokes => self.keystrokes,
            Metric::Words => self.words,
            Metric::Clicks => self.clicks,
            Metric::Scrolls => self.scrolls,
        }
    }
}

/// Activity of one calendar day as seen by every device that has reported it.
///
/// Each metric is an independent [GrowOnlyCounter]. Mouse travel is one as well: a device
/// reports its running total for the day rather than deltas, which keeps re-delivered
/// snapshots from being counted twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    day: NaiveDate,
    #[serde(default)]
    keystrokes: GrowOnlyCounter,
    #[serde(default)]
    words: GrowOnlyCounter,
    #[serde(default)]
    clicks: GrowOnlyCounter,
    #[serde(default)]
    scrolls: GrowOnlyCounter,
    #[serde(default, rename = "distance_millipixels")]
    distance: GrowOnlyCounter,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl DailyAggregate {
    pub fn new(day: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            day,
            keystrokes: GrowOnlyCounter::new(),
            words: GrowOnlyCounter::new(),
            clicks: GrowOnlyCounter::new(),
            scrolls: GrowOnlyCounter::new(),
            distance: GrowOnlyCounter::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn counter(&self, metric: Metric) -> &GrowOnlyCounter {
        match metric {
            Metric::Keystrokes => &self.keystrokes,
            Metric::Words => &self.words,
            Metric::Clicks => &self.clicks,
            Metric::Scrolls => &self.scrolls,
        }
    }

    fn counter_mut(&mut self, metric: Metric) -> &mut GrowOnlyCounter {
        match metric {
            Metric::Keystrokes => &mut self.keystrokes,
            Metric::Words => &mut self.words,
            Metric::Clicks => &mut self.clicks,
            Metric::Scrolls => &mut self.scrolls,
        }
    }

    pub fn increment(
        &mut self,
        device: &DeviceId,
        metric: Metric,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.counter_mut(metric).increment(device, amount)?;
        self.touch(now);
        Ok(())
    }

    /// Adds `pixels` of mouse travel to the running total of `device`. Deltas below a thousandth
    /// of a pixel are rejected like any other empty increment.
    pub fn increment_distance(
        &mut self,
        device: &DeviceId,
        pixels: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !pixels.is_finite() || pixels <= 0. {
            return Err(TallyError::InvalidIncrement { delta: pixels });
        }
        let millipixels = (pixels * MILLIPIXELS_PER_PIXEL).round() as u64;
        self.distance
            .increment(device, millipixels)
            .map_err(|_| TallyError::InvalidIncrement { delta: pixels })?;
        self.touch(now);
        Ok(())
    }

    /// Joins `other` into `self`. Returns whether any counter changed.
    pub fn merge(&mut self, other: &Self) -> Result<bool> {
        if other.day != self.day {
            return Err(TallyError::DayMismatch {
                expected: self.day,
                found: other.day,
            });
        }

        let mut changed = false;
        for metric in Metric::ALL {
            changed |= self.counter_mut(metric).merge(other.counter(metric));
        }
        changed |= self.distance.merge(&other.distance);

        self.created_at = self.created_at.min(other.created_at);
        self.modified_at = self.modified_at.max(other.modified_at);
        Ok(changed)
    }

    pub fn total(&self, metric: Metric) -> u64 {
        self.counter(metric).total()
    }

    /// Travelled distance in pixels over every device.
    pub fn total_distance(&self) -> f64 {
        self.distance.total() as f64 / MILLIPIXELS_PER_PIXEL
    }

    pub fn distance_of(&self, device: &DeviceId) -> f64 {
        self.distance.get(device) as f64 / MILLIPIXELS_PER_PIXEL
    }

    pub fn totals(&self) -> DayTotals {
        DayTotals {
            keystrokes: self.total(Metric::Keystrokes),
            words: self.total(Metric::Words),
            clicks: self.total(Metric::Clicks),
            scrolls: self.total(Metric::Scrolls),
            distance: self.total_distance(),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.modified_at = self.modified_at.max(now);
    }
}
