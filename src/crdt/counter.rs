use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    device::DeviceId,
    error::{Result, TallyError},
};

/// Grow-only counter. Every device owns one slot and only ever raises it, so merging two
/// replicas is a pointwise maximum and can never lose an increment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrowOnlyCounter {
    counts: BTreeMap<DeviceId, u64>,
}

impl GrowOnlyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the slot of `device`. Zero is rejected and leaves the counter untouched.
    pub fn increment(&mut self, device: &DeviceId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(TallyError::InvalidIncrement { delta: 0. });
        }
        let slot = self.counts.entry(device.clone()).or_insert(0);
        *slot = slot.saturating_add(amount);
        Ok(())
    }

    pub fn get(&self, device: &DeviceId) -> u64 {
        self.counts.get(device).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |sum, value| sum.saturating_add(*value))
    }

    /// Pointwise maximum over the union of devices. Returns whether `self` changed.
    pub fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (device, theirs) in &other.counts {
            let ours = self.counts.entry(device.clone()).or_insert(0);
            if *theirs > *ours {
                *ours = *theirs;
                changed = true;
            }
        }
        changed
    }

    pub fn devices(&self) -> impl Iterator<Item = (&DeviceId, u64)> {
        self.counts.iter().map(|(device, count)| (device, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
