use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::NaiveDate;
use futures::{stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    daemon::{
        collection::capture::CaptureDelta,
        storage::{LocalStore, RemoteStore},
    },
    device::DeviceId,
    history::{
        stats::compute_rolling_stats, DailyAggregate, HistoryStore, Metric, RollingStats,
    },
    utils::clock::Clock,
};

use super::{
    debounce::{wait_for, DebounceTimer},
    Command, HistorySnapshot, ReconcilerHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Loading,
    Ready,
    Persisting,
    Terminating,
}

/// Every day other than `today` and the statistics they give. Local increments only ever touch
/// today, so this is reused across snapshots until another day changes or the date moves.
struct SettledDays {
    today: NaiveDate,
    days: Arc<[DailyAggregate]>,
    stats: RollingStats,
}

impl SettledDays {
    fn collect(history: &HistoryStore, today: NaiveDate) -> Self {
        let others = history
            .all_days()
            .filter(|v| v.day() != today)
            .map(|v| (v.day(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        let stats = compute_rolling_stats(&others, today);
        Self {
            today,
            days: others.into_values().collect::<Vec<_>>().into(),
            stats,
        }
    }
}

enum Event {
    Command(Command),
    Remote(Vec<DailyAggregate>),
    Debounce,
    Closed,
}

/// Owns the [HistoryStore] and is the only place it is mutated.
///
/// The loop handles local increments, remote changes and debounce expiry one at a time. It
/// stops once every [ReconcilerHandle] is dropped, after force flushing whatever is unsaved.
/// `shutdown` only ends remote observation, so senders still get their last increments in.
pub struct SyncReconciler {
    history: HistoryStore,
    local: Box<dyn LocalStore>,
    remote: Option<Box<dyn RemoteStore>>,
    clock: Box<dyn Clock>,
    debounce: DebounceTimer,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<Arc<HistorySnapshot>>,
    settled: Option<SettledDays>,
    shutdown: CancellationToken,
    state: ReconcilerState,
}

impl SyncReconciler {
    pub fn new(
        device: DeviceId,
        local: Box<dyn LocalStore>,
        remote: Option<Box<dyn RemoteStore>>,
        clock: Box<dyn Clock>,
        debounce: Duration,
        shutdown: CancellationToken,
    ) -> (Self, ReconcilerHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let history = HistoryStore::new(device);
        let settled = SettledDays::collect(&history, clock.today());
        let initial = snapshot_of(&history, &settled, clock.as_ref(), 0);
        let (snapshot, view) = watch::channel(Arc::new(initial));

        let reconciler = Self {
            history,
            local,
            remote,
            clock,
            debounce: DebounceTimer::new(debounce),
            commands,
            snapshot,
            settled: Some(settled),
            shutdown,
            state: ReconcilerState::Idle,
        };
        (reconciler, ReconcilerHandle::new(sender, view))
    }

    fn transition(&mut self, state: ReconcilerState) {
        if self.state != state {
            debug!("Reconciler {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Executes the reconciler event loop.
    pub async fn run(mut self) -> Result<()> {
        // Subscribe before loading so nothing published in between is missed.
        let remote_changes = match &self.remote {
            Some(remote) => remote.observe_changes(self.shutdown.clone()),
            None => stream::pending().boxed(),
        };
        let mut remote_changes = remote_changes.fuse();

        self.load().await;

        loop {
            let deadline = self.debounce.deadline();
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => Event::Closed,
                },
                Some(days) = remote_changes.next() => Event::Remote(days),
                _ = wait_for(self.clock.as_ref(), deadline) => Event::Debounce,
            };

            match event {
                Event::Command(Command::Record(delta)) => self.apply_delta(delta),
                Event::Command(Command::RemoteChanged(days)) | Event::Remote(days) => {
                    self.merge_remote(days)
                }
                Event::Debounce => self.persist().await,
                Event::Closed => break,
            }
        }

        self.terminate().await;
        Ok(())
    }

    async fn load(&mut self) {
        self.transition(ReconcilerState::Loading);
        load_history(
            &mut self.history,
            self.local.as_ref(),
            self.remote.as_deref(),
        )
        .instrument(info_span!("Loading history"))
        .await;
        self.settled = None;

        // Remote days that local storage didn't know about yet.
        if self.history.is_dirty() {
            self.debounce.schedule(self.clock.instant());
        }
        self.transition(ReconcilerState::Ready);
        self.publish();
    }

    fn apply_delta(&mut self, delta: CaptureDelta) {
        let today = self.clock.today();
        let now = self.clock.time();
        for metric in Metric::ALL {
            let amount = delta.count(metric);
            if amount == 0 {
                continue;
            }
            if let Err(e) = self.history.record_increment(today, metric, amount, now) {
                debug!("Dropped {metric} increment: {e}");
            }
        }
        if delta.distance > 0. {
            if let Err(e) = self.history.record_distance(today, delta.distance, now) {
                debug!("Dropped distance increment: {e}");
            }
        }

        if self.history.is_dirty() {
            self.debounce.schedule(self.clock.instant());
            self.publish();
        }
    }

    fn merge_remote(&mut self, days: Vec<DailyAggregate>) {
        let today = self.clock.today();
        let mut changed = 0;
        for day in days {
            let date = day.day();
            if self.history.merge_remote_day(day) {
                changed += 1;
                if date != today {
                    self.settled = None;
                }
            }
        }
        if changed == 0 {
            debug!("Remote change carried nothing new");
            return;
        }
        info!("Merged {changed} remote days");
        self.debounce.schedule(self.clock.instant());
        self.publish();
    }

    async fn persist(&mut self) {
        self.transition(ReconcilerState::Persisting);
        self.debounce.cancel();

        let span = info_span!("Persisting history");
        async {
            for aggregate in self.history.dirty_days() {
                let day = aggregate.day();
                let local = self.local.save(&aggregate).await;
                if let Err(e) = &local {
                    warn!("Failed to save {day} locally, will retry later: {e}");
                }
                let remote = match &self.remote {
                    Some(remote) => remote.save(&aggregate).await,
                    None => Ok(()),
                };
                if let Err(e) = &remote {
                    warn!("Failed to publish {day}, will retry later: {e}");
                }
                if local.is_ok() && remote.is_ok() {
                    debug!("Persisted {day}");
                    self.history.mark_saved(&aggregate);
                }
            }
        }
        .instrument(span)
        .await;

        self.transition(ReconcilerState::Ready);
    }

    async fn terminate(&mut self) {
        self.transition(ReconcilerState::Terminating);
        self.debounce.cancel();
        if self.history.is_dirty() {
            info!("Flushing unsaved history before exit");
            self.persist().await;
        }
        if self.history.is_dirty() {
            warn!("Some days couldn't be saved before exit");
        }
    }

    fn publish(&mut self) {
        let today = self.clock.today();
        let settled = match self.settled.take() {
            Some(settled) if settled.today == today => settled,
            _ => SettledDays::collect(&self.history, today),
        };
        let revision = self.snapshot.borrow().revision + 1;
        let snapshot = snapshot_of(&self.history, &settled, self.clock.as_ref(), revision);
        self.settled = Some(settled);
        self.snapshot.send_replace(Arc::new(snapshot));
    }
}

fn snapshot_of(
    history: &HistoryStore,
    settled: &SettledDays,
    clock: &dyn Clock,
    revision: u64,
) -> HistorySnapshot {
    let today = settled.today;
    let recorded = history.day(today);
    let stats = match recorded {
        Some(aggregate) => settled
            .stats
            .clone()
            .with_record_candidate(today, &aggregate.totals()),
        None => settled.stats.clone(),
    };
    HistorySnapshot {
        today: recorded
            .cloned()
            .unwrap_or_else(|| DailyAggregate::new(today, clock.time())),
        stats,
        other_days: settled.days.clone(),
        revision,
        today_recorded: recorded.is_some(),
    }
}

/// Fills `history` from local storage, then joins whatever the remote currently holds.
/// Failing sources are logged and skipped.
pub async fn load_history(
    history: &mut HistoryStore,
    local: &dyn LocalStore,
    remote: Option<&dyn RemoteStore>,
) {
    match local.load_all().await {
        Ok(days) => {
            info!("Loaded {} local days", days.len());
            for day in days.into_values() {
                history.load_local_day(day);
            }
        }
        Err(e) => warn!("Failed to load local history, starting empty: {e}"),
    }

    let Some(remote) = remote else {
        return;
    };
    match remote.load_all().await {
        Ok(days) => {
            let total = days.len();
            let changed = days
                .into_values()
                .filter(|day| history.merge_remote_day(day.clone()))
                .count();
            info!("Loaded {total} remote days, {changed} brought changes");
        }
        Err(e) => warn!("Failed to load remote history: {e}"),
    }
}
