//! Integration tests for the subrelay persistence layer.
//!
//! These tests use a real SQLite database (in-memory) to verify repository
//! operations work correctly with the actual schema.

use std::sync::Arc;
use std::time::Duration;

use subrelay::cache::{CacheLayer, InFlightSet, MemoryCache, SubtitleCache};
use subrelay::database::models::{JobDbModel, JobKey, JobStatus};
use subrelay::database::repositories::{
    JobRepository, MetadataRepository, SqlxJobRepository, SqlxMetadataRepository,
};
use subrelay::database::time::now_ms;
use subrelay::database::{DbPool, init_pool, run_migrations};

const TTL_MS: i64 = 3_600_000;

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn test_key() -> JobKey {
    JobKey::new("dQw4w9WgXcQ", "en", "zh-CN", "asr", "json3")
}

mod job_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_job() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        assert!(repo.create_job(&job).await.unwrap());

        let loaded = repo.get_job(&job.id).await.unwrap();
        assert_eq!(loaded.video_id, "dQw4w9WgXcQ");
        assert_eq!(loaded.tlang, "zh-CN");
        assert_eq!(loaded.get_status(), Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_ignored() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let first = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        let second = JobDbModel::new(&test_key(), "hash-a", TTL_MS);

        assert!(repo.create_job(&first).await.unwrap());
        // Same (key, source_hash): the insert is silently dropped.
        assert!(!repo.create_job(&second).await.unwrap());

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.total(), 1);

        // A different source hash is a new unit of work.
        let other_hash = JobDbModel::new(&test_key(), "hash-b", TTL_MS);
        assert!(repo.create_job(&other_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_active() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        assert!(repo
            .find_active(&test_key(), "hash-a")
            .await
            .unwrap()
            .is_none());

        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        repo.create_job(&job).await.unwrap();
        assert!(repo
            .find_active(&test_key(), "hash-a")
            .await
            .unwrap()
            .is_some());

        // A terminal row is not active.
        let mut done = repo.get_job(&job.id).await.unwrap();
        done.mark_done("WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.000\nhi\n你好\n\n");
        repo.update_job(&done).await.unwrap();
        assert!(repo
            .find_active(&test_key(), "hash-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_claim_pending_is_single_winner() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        repo.create_job(&job).await.unwrap();

        assert!(repo.claim_pending(&job.id).await.unwrap());
        // Already TRANSLATING: the second claim loses.
        assert!(!repo.claim_pending(&job.id).await.unwrap());

        let loaded = repo.get_job(&job.id).await.unwrap();
        assert_eq!(loaded.get_status(), Some(JobStatus::Translating));
    }

    #[tokio::test]
    async fn test_retry_scheduling_and_scan() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        repo.create_job(&job).await.unwrap();
        repo.claim_pending(&job.id).await.unwrap();

        let mut row = repo.get_job(&job.id).await.unwrap();
        row.schedule_retry(-1, "llm_timeout", "timed out");
        repo.update_job(&row).await.unwrap();

        // Deadline already passed: the scan returns it.
        let due = repo.list_due_retries(now_ms(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, job.id);
        assert_eq!(due[0].retry_count, 1);
        assert_eq!(due[0].error_code.as_deref(), Some("llm_timeout"));

        // A future deadline keeps the row out of the scan.
        let mut row = repo.get_job(&job.id).await.unwrap();
        row.next_retry_at = Some(now_ms() + 60_000);
        repo.update_job(&row).await.unwrap();
        assert!(repo.list_due_retries(now_ms(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_pending_rows_are_not_swept() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        // A just-created row without a retry deadline must not be re-enqueued
        // by the scan (its enqueue message is still in the channel).
        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        repo.create_job(&job).await.unwrap();
        assert!(repo.list_due_retries(now_ms(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_interrupted() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        repo.create_job(&job).await.unwrap();
        repo.claim_pending(&job.id).await.unwrap();

        let flipped = repo.requeue_interrupted().await.unwrap();
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].id, job.id);

        let loaded = repo.get_job(&job.id).await.unwrap();
        assert_eq!(loaded.get_status(), Some(JobStatus::Pending));

        // Second pass finds nothing to flip.
        assert!(repo.requeue_interrupted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_latest_done_ignores_expired() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let mut job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        job.expires_at = now_ms() - 1;
        repo.create_job(&job).await.unwrap();

        let mut row = repo.get_job(&job.id).await.unwrap();
        row.mark_done("WEBVTT\n\n");
        repo.update_job(&row).await.unwrap();

        assert!(repo.find_latest_done(&test_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let mut expired = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        expired.expires_at = now_ms() - 1;
        repo.create_job(&expired).await.unwrap();

        let live = JobDbModel::new(&test_key(), "hash-b", TTL_MS);
        repo.create_job(&live).await.unwrap();

        assert_eq!(repo.delete_expired(now_ms()).await.unwrap(), 1);
        assert!(repo.get_job(&expired.id).await.is_err());
        assert!(repo.get_job(&live.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let pool = setup_test_db().await;
        let repo = SqlxJobRepository::new(pool);

        let a = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        let b = JobDbModel::new(&test_key(), "hash-b", TTL_MS);
        repo.create_job(&a).await.unwrap();
        repo.create_job(&b).await.unwrap();
        repo.claim_pending(&a.id).await.unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.translating, 1);
        assert_eq!(counts.total(), 2);
    }
}

mod metadata_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_seeded_by_migration() {
        let pool = setup_test_db().await;
        let repo = SqlxMetadataRepository::new(pool);

        let counters = repo.counters().await.unwrap();
        assert_eq!(counters.hits, 0);
        assert_eq!(counters.misses, 0);
        assert_eq!(repo.get("cache_version").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_increment_is_monotonic() {
        let pool = setup_test_db().await;
        let repo = SqlxMetadataRepository::new(pool);

        assert_eq!(repo.increment("cache_hits").await.unwrap(), 1);
        assert_eq!(repo.increment("cache_hits").await.unwrap(), 2);
        assert_eq!(repo.increment("cache_misses").await.unwrap(), 1);

        let counters = repo.counters().await.unwrap();
        assert_eq!(counters.hits, 2);
        assert_eq!(counters.misses, 1);
    }

    #[tokio::test]
    async fn test_increment_creates_missing_key() {
        let pool = setup_test_db().await;
        let repo = SqlxMetadataRepository::new(pool);
        assert_eq!(repo.increment("brand_new").await.unwrap(), 1);
    }
}

mod cache_tests {
    use super::*;

    const BILINGUAL: &str = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nhello\n你好\n\n";

    async fn setup_cache() -> (SubtitleCache, Arc<SqlxJobRepository>, Arc<SqlxMetadataRepository>) {
        let pool = setup_test_db().await;
        let jobs = Arc::new(SqlxJobRepository::new(pool.clone()));
        let metadata = Arc::new(SqlxMetadataRepository::new(pool));
        let cache = SubtitleCache::new(
            MemoryCache::new(10, Duration::from_secs(3600)),
            jobs.clone(),
            metadata.clone(),
        );
        (cache, jobs, metadata)
    }

    #[tokio::test]
    async fn test_total_miss_counts() {
        let (cache, _jobs, metadata) = setup_cache().await;

        assert!(cache.get(&test_key()).await.unwrap().is_none());
        let counters = metadata.counters().await.unwrap();
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.hits, 0);
    }

    #[tokio::test]
    async fn test_store_hit_promotes_to_memory() {
        let (cache, jobs, metadata) = setup_cache().await;

        let mut job = JobDbModel::new(&test_key(), "hash-a", TTL_MS);
        jobs.create_job(&job).await.unwrap();
        job.mark_done(BILINGUAL);
        jobs.update_job(&job).await.unwrap();

        // First lookup comes from the store and is promoted.
        let (text, layer) = cache.get(&test_key()).await.unwrap().unwrap();
        assert_eq!(text, BILINGUAL);
        assert_eq!(layer, CacheLayer::Store);
        assert_eq!(cache.memory_entries(), 1);

        // Second lookup is a memory hit.
        let (_, layer) = cache.get(&test_key()).await.unwrap().unwrap();
        assert_eq!(layer, CacheLayer::Memory);

        let counters = metadata.counters().await.unwrap();
        assert_eq!(counters.hits, 2);
        assert_eq!(counters.misses, 0);
    }

    #[tokio::test]
    async fn test_put_feeds_memory_layer() {
        let (cache, _jobs, _metadata) = setup_cache().await;

        cache.put(&test_key(), BILINGUAL.to_string(), now_ms() + TTL_MS);
        let (_, layer) = cache.get(&test_key()).await.unwrap().unwrap();
        assert_eq!(layer, CacheLayer::Memory);
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrent_creates() {
        let (_, jobs, _) = setup_cache().await;
        let in_flight = InFlightSet::new();

        // Fifty concurrent identical cache-miss requests race to create the
        // job; exactly one wins the in-flight claim and exactly one row
        // lands in the store.
        let mut handles = Vec::new();
        for _ in 0..50 {
            let jobs = jobs.clone();
            let in_flight = in_flight.clone();
            handles.push(tokio::spawn(async move {
                let key = test_key();
                if in_flight.insert(&key, "hash-a") {
                    let row = JobDbModel::new(&key, "hash-a", TTL_MS);
                    jobs.create_job(&row).await.unwrap()
                } else {
                    false
                }
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(jobs.count_by_status().await.unwrap().total(), 1);
    }
}
