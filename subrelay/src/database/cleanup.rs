//! Scheduled cleanup of expired job rows.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::database::repositories::JobRepository;
use crate::database::time::now_ms;

/// Periodic task deleting rows whose TTL has passed.
///
/// Errors are logged and the ticker keeps its schedule; the task never
/// touches live rows.
pub struct CleanupTask {
    jobs: Arc<dyn JobRepository>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl CleanupTask {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            interval,
            cancellation_token,
        }
    }

    /// Spawn the cleanup loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Cleanup task started");
            let mut ticker = tokio::time::interval(self.interval);
            // The immediate first tick would race startup recovery.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = self.cancellation_token.cancelled() => {
                        debug!("Cleanup task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.jobs.delete_expired(now_ms()).await {
                            Ok(0) => debug!("Cleanup pass: nothing expired"),
                            Ok(deleted) => info!(deleted, "Cleaned up expired job rows"),
                            Err(e) => error!(error = %e, "Cleanup pass failed"),
                        }
                    }
                }
            }
        })
    }
}
