//! Translation job worker.
//!
//! A long-running consumer that drains an in-process channel of translation
//! jobs with bounded concurrency and drives the job state machine:
//!
//! ```text
//! PENDING ──(claim)──▶ TRANSLATING ──(success)──▶ DONE
//!                        │
//!                        └──(error)──▶ retry scheduled (back to PENDING)
//!                                      └─(retries exhausted)──▶ FAILED
//! ```
//!
//! A periodic scan re-enqueues rows whose retry deadline has passed.

use std::sync::Arc;
use std::time::Duration;

use timedtext::{Cue, Format, SegmenterConfig};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{InFlightSet, SubtitleCache};
use crate::config::QueueConfig;
use crate::database::models::{JobDbModel, JobKey};
use crate::database::repositories::JobRepository;
use crate::database::time::now_ms;
use crate::fetcher::{UpstreamFetcher, source_hash};
use crate::translator::Translator;
use crate::{Error, Result};

/// Interval between retry-scan passes.
const RETRY_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Rows picked up per retry-scan pass.
const RETRY_SCAN_LIMIT: i64 = 16;

/// A unit of work handed from the dispatcher to the worker.
#[derive(Debug)]
pub struct TranslationJob {
    pub job_id: String,
    pub key: JobKey,
    pub source_hash: String,
    /// Upstream cues captured at enqueue time; `None` means the worker
    /// re-derives them with a fresh fetch (retry and recovery paths).
    pub cues: Option<Vec<Cue>>,
}

/// Everything a worker run needs.
pub struct WorkerDeps {
    pub jobs: Arc<dyn JobRepository>,
    pub cache: Arc<SubtitleCache>,
    pub in_flight: InFlightSet,
    pub translator: Arc<Translator>,
    pub fetcher: Arc<UpstreamFetcher>,
    pub segmenter: SegmenterConfig,
    pub queue: QueueConfig,
}

/// Handle to the spawned worker.
pub struct TranslationWorker {
    tx: mpsc::Sender<TranslationJob>,
    cancellation_token: CancellationToken,
    handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TranslationWorker {
    /// Spawn the worker loop.
    pub fn spawn(deps: WorkerDeps, cancellation_token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel::<TranslationJob>(512);
        let inner = Arc::new(WorkerInner {
            semaphore: Arc::new(Semaphore::new(deps.queue.concurrency.max(1))),
            deps,
        });

        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            inner.run(rx, token).await;
        });

        Self {
            tx,
            cancellation_token,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Hand a job to the worker without blocking the request path.
    ///
    /// A full channel is not an error: the row stays PENDING and the retry
    /// scan picks it up later.
    pub fn enqueue(&self, job: TranslationJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Job channel full, deferring to retry scan");
                false
            }
        }
    }

    /// Cancel the loop and wait up to `drain` for in-flight jobs.
    pub async fn shutdown(&self, drain: Duration) {
        self.cancellation_token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(drain, handle).await.is_err() {
                warn!("Worker did not drain in time; jobs will be recovered on restart");
            }
        }
    }
}

struct WorkerInner {
    deps: WorkerDeps,
    semaphore: Arc<Semaphore>,
}

impl WorkerInner {
    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<TranslationJob>,
        cancellation_token: CancellationToken,
    ) {
        info!(
            concurrency = self.deps.queue.concurrency,
            "Translation worker started"
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut retry_tick = tokio::time::interval(RETRY_SCAN_INTERVAL);
        retry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Worker loop shutting down");
                    break;
                }
                Some(job) = rx.recv() => {
                    self.dispatch(job, &mut tasks).await;
                }
                _ = retry_tick.tick() => {
                    if let Err(e) = self.scan_retries(&mut tasks).await {
                        error!(error = %e, "Retry scan failed");
                    }
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Brief drain window; whatever is left becomes startup-recovery work.
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
            warn!("In-flight jobs abandoned at shutdown");
        }
        info!("Translation worker stopped");
    }

    async fn dispatch(self: &Arc<Self>, job: TranslationJob, tasks: &mut JoinSet<()>) {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let inner = self.clone();
        tasks.spawn(async move {
            let _permit = permit;
            inner.process(job).await;
        });
    }

    /// Re-enqueue rows whose retry deadline has passed.
    async fn scan_retries(self: &Arc<Self>, tasks: &mut JoinSet<()>) -> Result<()> {
        let due = self
            .deps
            .jobs
            .list_due_retries(now_ms(), RETRY_SCAN_LIMIT)
            .await?;

        for row in due {
            let key = row.key();
            if !self.deps.in_flight.insert(&key, &row.source_hash) {
                continue;
            }
            debug!(job_id = %row.id, retry_count = row.retry_count, "Re-enqueueing job");
            self.dispatch(
                TranslationJob {
                    job_id: row.id,
                    key,
                    source_hash: row.source_hash,
                    cues: None,
                },
                tasks,
            )
            .await;
        }

        Ok(())
    }

    /// Run one job to a terminal or retry state.
    ///
    /// The in-flight claim is released on every exit path.
    async fn process(&self, job: TranslationJob) {
        let claimed = match self.deps.jobs.claim_pending(&job.job_id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "Failed to claim job");
                self.deps.in_flight.remove(&job.key, &job.source_hash);
                return;
            }
        };
        if !claimed {
            debug!(job_id = %job.job_id, "Job already claimed or terminal, skipping");
            self.deps.in_flight.remove(&job.key, &job.source_hash);
            return;
        }

        let started = std::time::Instant::now();
        match self.run_pipeline(&job).await {
            Ok(bilingual) => {
                self.complete(&job, bilingual).await;
                info!(
                    job_id = %job.job_id,
                    key = %job.key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Translation job done"
                );
            }
            Err(e) => {
                warn!(job_id = %job.job_id, key = %job.key, error = %e, "Translation job failed");
                self.record_failure(&job.job_id, &e).await;
            }
        }

        self.deps.in_flight.remove(&job.key, &job.source_hash);
    }

    /// Segment, translate and render one track.
    async fn run_pipeline(&self, job: &TranslationJob) -> Result<String> {
        let cues = match &job.cues {
            Some(cues) => cues.clone(),
            None => self.rederive_cues(job).await?,
        };

        let mut segmented = timedtext::segment_cues(&cues, &self.deps.segmenter);
        timedtext::optimize_timing(&mut segmented);

        let bilingual = self.deps.translator.translate(&segmented).await?;
        let vtt = timedtext::render(Format::Vtt, &bilingual, self.deps.segmenter.overlap_gap_ms);

        // A done row must round-trip through the codec.
        if timedtext::parse(Format::Vtt, &vtt)?.is_empty() {
            return Err(Error::Other("rendered track is empty".into()));
        }

        Ok(vtt)
    }

    /// Fetch the upstream track again for a job whose cues were not carried
    /// in the enqueue message.
    async fn rederive_cues(&self, job: &TranslationJob) -> Result<Vec<Cue>> {
        let fetched = self.deps.fetcher.fetch(&job.key, None).await?;
        let hash = source_hash(&fetched.cues);
        if hash != job.source_hash {
            // The upstream track changed; this row can never complete. The
            // next client request creates a fresh job under the new hash.
            return Err(Error::SourceChanged(format!(
                "{} -> {}",
                &job.source_hash[..8.min(job.source_hash.len())],
                &hash[..8]
            )));
        }
        Ok(fetched.cues)
    }

    async fn complete(&self, job: &TranslationJob, bilingual: String) {
        let mut row = match self.deps.jobs.get_job(&job.job_id).await {
            Ok(row) => row,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "Finished job row disappeared");
                return;
            }
        };

        row.mark_done(bilingual.clone());
        if let Err(e) = self.deps.jobs.update_job(&row).await {
            error!(job_id = %job.job_id, error = %e, "Failed to persist finished job");
            return;
        }

        self.deps.cache.put(&job.key, bilingual, row.expires_at);
    }

    /// Apply the backoff state machine to a failed attempt.
    async fn record_failure(&self, job_id: &str, cause: &Error) {
        let mut row: JobDbModel = match self.deps.jobs.get_job(job_id).await {
            Ok(row) => row,
            Err(e) => {
                error!(job_id, error = %e, "Failed job row disappeared");
                return;
            }
        };

        let code = cause.job_error_code();
        let message = cause.to_string();

        // A changed source can never succeed; retrying would only rediscover
        // the mismatch.
        let terminal = matches!(cause, Error::SourceChanged(_));
        if terminal || row.retry_count >= self.deps.queue.max_retries {
            row.mark_failed(code, message);
        } else {
            let delay = self.deps.queue.retry_base_ms << row.retry_count.min(20);
            row.schedule_retry(delay, code, message);
        }

        if let Err(e) = self.deps.jobs.update_job(&row).await {
            error!(job_id, error = %e, "Failed to persist job failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base: i64 = 5000;
        let delays: Vec<i64> = (0..4).map(|attempt| base << attempt).collect();
        assert_eq!(delays, vec![5000, 10_000, 20_000, 40_000]);
    }
}
