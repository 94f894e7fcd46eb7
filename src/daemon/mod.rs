use std::path::Path;

use anyhow::Result;
use collection::{capture::CaptureBuffer, collector::CaptureModule, feed::FeedModule};
use config::Settings;
use storage::{local::FileHistoryStore, remote::SharedDirRemote, RemoteStore};
use sync::reconciler::SyncReconciler;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    device::{self, DEVICE_FILE},
    utils::clock::{Clock, DefaultClock},
};

pub mod collection;
pub mod config;
pub mod shutdown;
pub mod storage;
pub mod sync;

pub const DAYS_DIR: &str = "days";

/// Represents the starting point for the service. Events are read from stdin until a shutdown
/// signal arrives.
pub async fn start_daemon(dir: &Path, settings: &Settings) -> Result<()> {
    let shutdown_token = CancellationToken::new();
    let input = BufReader::new(tokio::io::stdin());

    // Setup failures return before the signal listener starts waiting.
    let service = Service::create(dir, settings, input, shutdown_token.clone(), DefaultClock)?;

    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        service.run(),
    );
    result
}

/// Every module of a running service, wired together but not started yet.
pub struct Service<R> {
    feed: FeedModule<R>,
    capture: CaptureModule,
    reconciler: SyncReconciler,
}

impl<R: AsyncBufRead + Unpin> Service<R> {
    /// Loads the device identity and opens the stores. Nothing runs until [Service::run].
    pub fn create<C: Clock + Clone>(
        dir: &Path,
        settings: &Settings,
        input: R,
        shutdown: CancellationToken,
        clock: C,
    ) -> Result<Self> {
        let device = device::load_or_create(&dir.join(DEVICE_FILE))?;
        info!("Running as device {device}");
        let (local, remote) = open_stores(dir, settings)?;

        let (reconciler, handle) = SyncReconciler::new(
            device,
            Box::new(local),
            remote,
            Box::new(clock.clone()),
            settings.debounce(),
            shutdown.clone(),
        );
        let buffer = CaptureBuffer::new();
        let capture = CaptureModule::new(
            buffer.clone(),
            handle,
            shutdown.clone(),
            settings.flush_interval(),
            Box::new(clock),
        );
        let feed = FeedModule::new(input, buffer, shutdown);

        Ok(Self {
            feed,
            capture,
            reconciler,
        })
    }

    /// Runs every module until the shutdown token is cancelled and the reconciler has flushed.
    pub async fn run(self) -> Result<()> {
        let (feed_result, capture_result, reconciler_result) = tokio::join!(
            self.feed.run(),
            self.capture.run(),
            self.reconciler.run()
        );

        if let Err(feed_result) = feed_result {
            error!("Feed module got an error {:?}", feed_result);
        }

        if let Err(capture_result) = capture_result {
            error!("Capture module got an error {:?}", capture_result);
        }

        if let Err(reconciler_result) = reconciler_result {
            error!("Reconciler got an error {:?}", reconciler_result);
        }

        Ok(())
    }
}

/// Opens the local day files in `dir` and, when configured, the shared remote directory.
pub fn open_stores(
    dir: &Path,
    settings: &Settings,
) -> Result<(FileHistoryStore, Option<Box<dyn RemoteStore>>)> {
    let local = FileHistoryStore::new(dir.join(DAYS_DIR))?;
    let remote = match &settings.remote_dir {
        Some(remote_dir) => {
            info!("Syncing through {}", remote_dir.display());
            let remote = SharedDirRemote::new(
                remote_dir.clone(),
                settings.remote_quota_bytes,
                settings.remote_poll(),
            )?;
            Some(Box::new(remote) as Box<dyn RemoteStore>)
        }
        None => None,
    };
    Ok((local, remote))
}
