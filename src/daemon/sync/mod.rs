//! Serialized owner of the history. Everything that touches the cache, local increments,
//! remote merges and persistence, goes through one [reconciler::SyncReconciler] task. Other
//! components talk to it through a [ReconcilerHandle] and read from it through a
//! [HistoryView].

pub mod debounce;
pub mod reconciler;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::{
    error::{Result, TallyError},
    history::{DailyAggregate, Metric, RollingStats},
};

use super::collection::capture::CaptureDelta;

#[derive(Debug)]
pub enum Command {
    Record(CaptureDelta),
    RemoteChanged(Vec<DailyAggregate>),
}

/// State published after every committed mutation.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub today: DailyAggregate,
    pub stats: RollingStats,
    /// Every day except today, oldest first. Shared between snapshots until one of them changes.
    pub other_days: Arc<[DailyAggregate]>,
    pub revision: u64,
    today_recorded: bool,
}

impl HistorySnapshot {
    /// Every known day including today, oldest first.
    pub fn all_days(&self) -> Vec<DailyAggregate> {
        let mut days = self.other_days.to_vec();
        if self.today_recorded {
            let at = days.partition_point(|v| v.day() < self.today.day());
            days.insert(at, self.today.clone());
        }
        days
    }
}

/// Write side of the reconciler. The reconciler keeps running while any handle is alive.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: HistoryView,
}

impl ReconcilerHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<Arc<HistorySnapshot>>,
    ) -> Self {
        Self {
            commands,
            view: HistoryView { snapshot },
        }
    }

    /// Queues `delta` for today's entry. Never blocks.
    pub fn record(&self, delta: CaptureDelta) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        self.send(Command::Record(delta))
    }

    pub fn record_increment(&self, metric: Metric, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(TallyError::InvalidIncrement { delta: 0. });
        }
        let mut delta = CaptureDelta::default();
        delta.add(metric, amount);
        self.record(delta)
    }

    pub fn record_distance(&self, pixels: f64) -> Result<()> {
        if !pixels.is_finite() || pixels <= 0. {
            return Err(TallyError::InvalidIncrement { delta: pixels });
        }
        self.record(CaptureDelta {
            distance: pixels,
            ..Default::default()
        })
    }

    /// Hands days received by an external transport over to the reconciler. Safe to call from
    /// any thread.
    pub fn merge_remote(&self, days: Vec<DailyAggregate>) -> Result<()> {
        self.send(Command::RemoteChanged(days))
    }

    pub fn view(&self) -> HistoryView {
        self.view.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TallyError::ChannelClosed)
    }
}

/// Read side of the reconciler for presentation code. Doesn't keep the reconciler alive.
#[derive(Clone)]
pub struct HistoryView {
    snapshot: watch::Receiver<Arc<HistorySnapshot>>,
}

impl HistoryView {
    pub fn snapshot(&self) -> Arc<HistorySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn today(&self) -> DailyAggregate {
        self.snapshot.borrow().today.clone()
    }

    pub fn rolling_stats(&self) -> RollingStats {
        self.snapshot.borrow().stats.clone()
    }

    pub fn all_days(&self) -> Vec<DailyAggregate> {
        self.snapshot.borrow().all_days()
    }

    /// Waits for the next published change.
    pub async fn changed(&mut self) -> Result<Arc<HistorySnapshot>> {
        self.snapshot
            .changed()
            .await
            .map_err(|_| TallyError::ChannelClosed)?;
        Ok(self.snapshot.borrow_and_update().clone())
    }

    /// Waits until a published snapshot satisfies `predicate`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&HistorySnapshot) -> bool,
    ) -> Result<Arc<HistorySnapshot>> {
        loop {
            let snapshot = self.snapshot.borrow_and_update().clone();
            if predicate(&snapshot) {
                return Ok(snapshot);
            }
            self.snapshot
                .changed()
                .await
                .map_err(|_| TallyError::ChannelClosed)?;
        }
    }
}
