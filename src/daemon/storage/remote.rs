use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, TallyError},
    fs::operations::{read_shared, write_atomic, ExclusiveLock},
    history::DailyAggregate,
};

use super::{collect_days, DayMap, RemoteStore};

pub const REMOTE_BLOB_NAME: &str = "tallysync-remote.json";
const REMOTE_LOCK_NAME: &str = "tallysync-remote.lock";

/// Key-value stores offered by sync services are typically limited to about a megabyte.
pub const DEFAULT_REMOTE_QUOTA: usize = 1_000_000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteBlob {
    days: Vec<DailyAggregate>,
}

/// [RemoteStore] kept as a single JSON blob inside a directory that an external tool
/// (Syncthing, a cloud drive, a network share) replicates between devices.
///
/// Every save is a read-modify-write that joins the saved day into the stored one, so two
/// devices racing on the same day still converge once both writes have been seen.
pub struct SharedDirRemote {
    dir: PathBuf,
    quota: usize,
    poll_interval: Duration,
}

impl SharedDirRemote {
    pub fn new(dir: PathBuf, quota: usize, poll_interval: Duration) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota,
            poll_interval,
        })
    }

    fn blob_path(&self) -> PathBuf {
        self.dir.join(REMOTE_BLOB_NAME)
    }

    async fn read_blob(path: &Path) -> Result<DayMap> {
        let Some(content) = read_shared(path)
            .await
            .map_err(|e| TallyError::io(path, e))?
        else {
            return Ok(DayMap::new());
        };
        let blob = serde_json::from_slice::<RemoteBlob>(&content)
            .map_err(|e| TallyError::serialization(path.to_string_lossy(), e))?;
        Ok(collect_days(blob.days))
    }

    /// Serializes `days`, evicting the oldest ones until the blob fits into the quota. The day
    /// that is being saved is never evicted.
    fn encode_within_quota(&self, mut days: DayMap, keep: &DailyAggregate) -> Result<Vec<u8>> {
        loop {
            let blob = RemoteBlob {
                days: days.values().cloned().collect(),
            };
            let content = serde_json::to_vec(&blob)
                .map_err(|e| TallyError::serialization("remote blob", e))?;
            if content.len() <= self.quota {
                return Ok(content);
            }
            match days.first_key_value() {
                Some((oldest, _)) if *oldest != keep.day() => {
                    let oldest = *oldest;
                    info!("Remote blob over quota, evicting {oldest}");
                    days.remove(&oldest);
                }
                _ => {
                    return Err(TallyError::QuotaExceeded {
                        size: content.len(),
                        quota: self.quota,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl RemoteStore for SharedDirRemote {
    async fn load_all(&self) -> Result<DayMap> {
        Self::read_blob(&self.blob_path()).await
    }

    async fn save(&self, aggregate: &DailyAggregate) -> Result<()> {
        let lock_path = self.dir.join(REMOTE_LOCK_NAME);
        let lock = ExclusiveLock::acquire(&lock_path)
            .await
            .map_err(|e| TallyError::io(&lock_path, e))?;

        let result: Result<()> = async {
            let path = self.blob_path();
            // An unreadable blob may be a transfer in progress, so it is never overwritten.
            let mut days = Self::read_blob(&path).await?;
            match days.get_mut(&aggregate.day()) {
                Some(stored) => {
                    stored.merge(aggregate)?;
                }
                None => {
                    days.insert(aggregate.day(), aggregate.clone());
                }
            }
            let content = self.encode_within_quota(days, aggregate)?;
            write_atomic(&path, &content)
                .await
                .map_err(|e| TallyError::io(&path, e))
        }
        .await;

        lock.release()
            .await
            .map_err(|e| TallyError::io(&lock_path, e))?;
        result
    }

    fn observe_changes(
        &self,
        shutdown: CancellationToken,
    ) -> BoxStream<'static, Vec<DailyAggregate>> {
        let (sender, receiver) = mpsc::channel(16);
        let watcher = BlobWatcher {
            path: self.blob_path(),
            poll_interval: self.poll_interval,
        };
        tokio::spawn(watcher.run(sender, shutdown));
        Box::pin(ReceiverStream::new(receiver))
    }
}

/// Every that many polls the blob is read even if its metadata looks untouched.
const FULL_READ_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlobStamp {
    modified: SystemTime,
    len: u64,
}

/// Polls the blob and reports days whose content differs from the previous poll.
struct BlobWatcher {
    path: PathBuf,
    poll_interval: Duration,
}

impl BlobWatcher {
    async fn stamp(&self) -> Option<BlobStamp> {
        let metadata = tokio::fs::metadata(&self.path).await.ok()?;
        Some(BlobStamp {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }

    async fn run(self, sender: mpsc::Sender<Vec<DailyAggregate>>, shutdown: CancellationToken) {
        let mut last_stamp = self.stamp().await;
        let mut polls: u32 = 0;
        let mut last_seen = SharedDirRemote::read_blob(&self.path)
            .await
            .unwrap_or_default();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sender.closed() => return,
                _ = tokio::time::sleep(self.poll_interval) => ()
            }

            // Coarse modification times can hide a rewrite, so size is compared too and the
            // blob is periodically read regardless.
            polls = polls.wrapping_add(1);
            let stamp = self.stamp().await;
            if stamp.is_none() || (stamp == last_stamp && polls % FULL_READ_EVERY != 0) {
                continue;
            }
            last_stamp = stamp;

            let current = match SharedDirRemote::read_blob(&self.path).await {
                Ok(v) => v,
                Err(e) => {
                    // Sync tools may expose a partially transferred file for a moment.
                    warn!("Failed to read remote blob {e}");
                    continue;
                }
            };
            let changed = current
                .values()
                .filter(|day| last_seen.get(&day.day()) != Some(*day))
                .cloned()
                .collect::<Vec<_>>();
            last_seen = current;

            if changed.is_empty() {
                continue;
            }
            debug!("Remote blob changed {} days", changed.len());
            if sender.send(changed).await.is_err() {
                return;
            }
        }
    }
}
