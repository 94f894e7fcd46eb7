use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::history::Metric;

/// Activity accumulated between two flushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureDelta {
    pub keystrokes: u64,
    pub words: u64,
    pub clicks: u64,
    pub scrolls: u64,
    /// Pixels.
    pub distance: f64,
}

impl CaptureDelta {
    pub fn count(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Keystrokes => self.keystrokes,
            Metric::Words => self.words,
            Metric::Clicks => self.clicks,
            Metric::Scrolls => self.scrolls,
        }
    }

    pub fn add(&mut self, metric: Metric, amount: u64) {
        let slot = match metric {
            Metric::Keystrokes => &mut self.keystrokes,
            Metric::Words => &mut self.words,
            Metric::Clicks => &mut self.clicks,
            Metric::Scrolls => &mut self.scrolls,
        };
        *slot = slot.saturating_add(amount);
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|v| self.count(*v) == 0) && self.distance <= 0.
    }
}

/// Shared accumulator written by capture hooks and drained by the
/// [CaptureModule](super::collector::CaptureModule). The lock is only held for constant time
/// additions.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    pending: Arc<Mutex<CaptureDelta>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_delta(&self, metric: Metric, amount: u64) {
        if amount == 0 {
            debug!("Ignoring empty {metric} delta");
            return;
        }
        self.pending.lock().add(metric, amount);
    }

    pub fn on_distance_delta(&self, pixels: f64) {
        if !pixels.is_finite() || pixels <= 0. {
            debug!("Ignoring invalid distance delta {pixels}");
            return;
        }
        self.pending.lock().distance += pixels;
    }

    /// Takes everything accumulated so far, leaving the buffer empty.
    pub fn drain(&self) -> CaptureDelta {
        std::mem::take(&mut *self.pending.lock())
    }
}
