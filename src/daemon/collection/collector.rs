use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{daemon::sync::ReconcilerHandle, utils::clock::Clock};

use super::capture::CaptureBuffer;

/// Moves accumulated capture deltas over to the reconciler at a fixed frequency.
pub struct CaptureModule {
    buffer: CaptureBuffer,
    next: ReconcilerHandle,
    shutdown: CancellationToken,
    flush_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl CaptureModule {
    pub fn new(
        buffer: CaptureBuffer,
        next: ReconcilerHandle,
        shutdown: CancellationToken,
        flush_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            buffer,
            next,
            shutdown,
            flush_frequency,
            time_provider,
        }
    }

    fn flush(&self) -> Result<()> {
        let delta = self.buffer.drain();
        if delta.is_empty() {
            return Ok(());
        }
        debug!("Forwarding {:?}", delta);
        self.next
            .record(delta)
            .inspect_err(|e| error!("Unexpected error during forwarding {e:?}"))?;
        Ok(())
    }

    /// Executes the capture event loop.
    pub async fn run(self) -> Result<()> {
        let mut flush_point = self.time_provider.instant();
        loop {
            flush_point += self.flush_frequency;

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // our reconciler handle and let the reconciler finish.
                _ = self.shutdown.cancelled() => {
                    info!("Capture stopped, forwarding what is left");
                    return self.flush();
                }
                _ = self.time_provider.sleep_until(flush_point) => ()
            }

            self.flush()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::capture::CaptureBuffer,
            storage::memory::MemoryLocal,
            sync::reconciler::SyncReconciler,
        },
        device::DeviceId,
        history::Metric,
        utils::{clock::SimulatedClock, logging::TEST_LOGGING},
    };

    use super::CaptureModule;

    #[tokio::test(start_paused = true)]
    async fn test_buffer_reaches_storage() -> Result<()> {
        *TEST_LOGGING;
        let clock =
            SimulatedClock::starting_at(Utc.with_ymd_and_hms(2018, 7, 4, 8, 0, 0).unwrap());
        let local = MemoryLocal::default();
        let shutdown = CancellationToken::new();
        let (reconciler, handle) = SyncReconciler::new(
            DeviceId::new("local"),
            Box::new(local.clone()),
            None,
            Box::new(clock.clone()),
            Duration::from_secs(1),
            shutdown.clone(),
        );
        let mut view = handle.view();
        let buffer = CaptureBuffer::new();
        let capture = CaptureModule::new(
            buffer.clone(),
            handle,
            shutdown.clone(),
            Duration::from_millis(100),
            Box::new(clock),
        );

        let (capture_result, reconciler_result, _) = tokio::join!(
            capture.run(),
            reconciler.run(),
            async {
                buffer.on_delta(Metric::Keystrokes, 3);
                buffer.on_distance_delta(40.);
                let snapshot = view
                    .wait_for(|v| v.today.total(Metric::Keystrokes) == 3)
                    .await
                    .unwrap();
                assert_eq!(snapshot.today.total_distance(), 40.);

                // Lands in the final drain.
                buffer.on_delta(Metric::Clicks, 2);
                shutdown.cancel();
            }
        );
        capture_result?;
        reconciler_result?;

        let days = local.days();
        let day = days.values().next().unwrap();
        assert_eq!(day.total(Metric::Keystrokes), 3);
        assert_eq!(day.total(Metric::Clicks), 2);
        Ok(())
    }
}
