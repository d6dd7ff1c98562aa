//! Service container wiring all application services.
//!
//! Everything that used to be a lazy global in ancestors of this design is
//! an explicit dependency here: built once at process start, threaded down
//! through constructors, torn down in reverse order at shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::cache::{InFlightSet, MemoryCache, SubtitleCache};
use crate::config::AppConfig;
use crate::database::repositories::{
    JobRepository, MetadataRepository, SqlxJobRepository, SqlxMetadataRepository,
};
use crate::database::{self, CleanupTask, DbPool};
use crate::fetcher::UpstreamFetcher;
use crate::translator::{LlmClient, Translator};
use crate::worker::{TranslationJob, TranslationWorker, WorkerDeps};

/// How long shutdown waits for in-flight translation jobs.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Service container holding all application services.
pub struct ServiceContainer {
    pub config: AppConfig,
    pub pool: DbPool,
    pub jobs: Arc<dyn JobRepository>,
    pub metadata: Arc<dyn MetadataRepository>,
    pub cache: Arc<SubtitleCache>,
    pub in_flight: InFlightSet,
    pub fetcher: Arc<UpstreamFetcher>,
    pub worker: TranslationWorker,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build and start all services.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>> {
        let cancellation_token = CancellationToken::new();

        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let jobs: Arc<dyn JobRepository> = Arc::new(SqlxJobRepository::new(pool.clone()));
        let metadata: Arc<dyn MetadataRepository> =
            Arc::new(SqlxMetadataRepository::new(pool.clone()));

        let memory = MemoryCache::new(
            config.cache.lru_max_items,
            Duration::from_millis(config.cache.ttl_ms().max(0) as u64),
        );
        let cache = Arc::new(SubtitleCache::new(memory, jobs.clone(), metadata.clone()));
        let in_flight = InFlightSet::new();

        let fetcher = Arc::new(UpstreamFetcher::new(config.upstream_timeout)?);

        let llm_client = Arc::new(
            LlmClient::new(&config.llm).map_err(|e| crate::Error::config(e.to_string()))?,
        );
        let translator = Arc::new(Translator::new(
            llm_client,
            config.target_lang.clone(),
            config.guidance.clone(),
            config.context.clone(),
        ));

        let worker = TranslationWorker::spawn(
            WorkerDeps {
                jobs: jobs.clone(),
                cache: cache.clone(),
                in_flight: in_flight.clone(),
                translator,
                fetcher: fetcher.clone(),
                segmenter: config.segmenter.clone(),
                queue: config.queue.clone(),
            },
            cancellation_token.child_token(),
        );

        CleanupTask::new(
            jobs.clone(),
            config.cache.cleanup_interval,
            cancellation_token.child_token(),
        )
        .spawn();

        let container = Arc::new(Self {
            config,
            pool,
            jobs,
            metadata,
            cache,
            in_flight,
            fetcher,
            worker,
            cancellation_token,
        });

        container.recover_interrupted().await;

        Ok(container)
    }

    /// Re-enqueue jobs a previous process left in TRANSLATING.
    async fn recover_interrupted(&self) {
        let rows = match self.jobs.requeue_interrupted().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Startup recovery failed");
                return;
            }
        };
        if rows.is_empty() {
            return;
        }

        info!(count = rows.len(), "Recovering interrupted translation jobs");
        for row in rows {
            let key = row.key();
            if self.in_flight.insert(&key, &row.source_hash) {
                let enqueued = self.worker.enqueue(TranslationJob {
                    job_id: row.id,
                    key: key.clone(),
                    source_hash: row.source_hash.clone(),
                    cues: None,
                });
                if !enqueued {
                    self.in_flight.remove(&key, &row.source_hash);
                }
            }
        }
    }

    /// Token shared by the server loop and background tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Graceful shutdown: stop intake, drain the worker briefly, close the
    /// store.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.worker.shutdown(SHUTDOWN_DRAIN).await;
        self.pool.close().await;
        info!("Shutdown complete");
    }
}
