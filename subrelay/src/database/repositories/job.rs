//! Translation job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{JobCounts, JobDbModel, JobKey, JobStatus};
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a job row, ignoring the insert when an identical
    /// (key, source_hash) row already exists.
    ///
    /// Returns `true` if a row was actually inserted. This conflict-ignoring
    /// insert is what enforces the single-active-job invariant at the store.
    async fn create_job(&self, job: &JobDbModel) -> Result<bool>;

    async fn get_job(&self, id: &str) -> Result<JobDbModel>;

    /// Find a non-terminal job for (key, source_hash), if any.
    async fn find_active(&self, key: &JobKey, source_hash: &str) -> Result<Option<JobDbModel>>;

    /// Find the most recent unexpired DONE row for a key, regardless of
    /// source hash.
    async fn find_latest_done(&self, key: &JobKey) -> Result<Option<JobDbModel>>;

    /// Persist all mutable fields of a job row.
    async fn update_job(&self, job: &JobDbModel) -> Result<()>;

    /// Atomically transition a PENDING job to TRANSLATING.
    ///
    /// Returns `true` when this caller won the claim; `false` means another
    /// worker already owns the row (or it reached a terminal state).
    async fn claim_pending(&self, id: &str) -> Result<bool>;

    /// PENDING jobs due for another attempt: rows whose retry deadline has
    /// passed, plus rows without a deadline that have sat untouched for a
    /// minute (an enqueue lost to a full channel or a crash).
    async fn list_due_retries(&self, now: i64, limit: i64) -> Result<Vec<JobDbModel>>;

    /// Startup recovery: jobs left TRANSLATING by a previous process go back
    /// to PENDING. Returns the rows that were flipped.
    async fn requeue_interrupted(&self) -> Result<Vec<JobDbModel>>;

    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<JobDbModel>>;

    async fn count_by_status(&self) -> Result<JobCounts>;

    /// Delete rows whose `expires_at` has passed. Returns the deleted count.
    async fn delete_expired(&self, now: i64) -> Result<u64>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn create_job(&self, job: &JobDbModel) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO translation_jobs (
                id, video_id, lang, tlang, track, fmt, source_hash,
                status, retry_count, next_retry_at, error_code, error_message,
                bilingual, created_at, updated_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (video_id, lang, tlang, track, fmt, source_hash) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.video_id)
        .bind(&job.lang)
        .bind(&job.tlang)
        .bind(&job.track)
        .bind(&job.fmt)
        .bind(&job.source_hash)
        .bind(&job.status)
        .bind(job.retry_count)
        .bind(job.next_retry_at)
        .bind(&job.error_code)
        .bind(&job.error_message)
        .bind(&job.bilingual)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_job(&self, id: &str) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM translation_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn find_active(&self, key: &JobKey, source_hash: &str) -> Result<Option<JobDbModel>> {
        let job = sqlx::query_as::<_, JobDbModel>(
            r#"
            SELECT * FROM translation_jobs
            WHERE video_id = ? AND lang = ? AND tlang = ? AND track = ? AND fmt = ?
              AND source_hash = ? AND status IN ('PENDING', 'TRANSLATING')
            LIMIT 1
            "#,
        )
        .bind(&key.video_id)
        .bind(&key.lang)
        .bind(&key.tlang)
        .bind(&key.track)
        .bind(&key.fmt)
        .bind(source_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn find_latest_done(&self, key: &JobKey) -> Result<Option<JobDbModel>> {
        let job = sqlx::query_as::<_, JobDbModel>(
            r#"
            SELECT * FROM translation_jobs
            WHERE video_id = ? AND lang = ? AND tlang = ? AND track = ? AND fmt = ?
              AND status = 'DONE' AND expires_at > ?
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(&key.video_id)
        .bind(&key.lang)
        .bind(&key.tlang)
        .bind(&key.track)
        .bind(&key.fmt)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn update_job(&self, job: &JobDbModel) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE translation_jobs SET
                status = ?, retry_count = ?, next_retry_at = ?,
                error_code = ?, error_message = ?, bilingual = ?,
                updated_at = ?, expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.status)
        .bind(job.retry_count)
        .bind(job.next_retry_at)
        .bind(&job.error_code)
        .bind(&job.error_message)
        .bind(&job.bilingual)
        .bind(job.updated_at)
        .bind(job.expires_at)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_pending(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE translation_jobs SET status = 'TRANSLATING', updated_at = ? \
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_due_retries(&self, now: i64, limit: i64) -> Result<Vec<JobDbModel>> {
        const STALE_PENDING_MS: i64 = 60_000;

        let jobs = sqlx::query_as::<_, JobDbModel>(
            r#"
            SELECT * FROM translation_jobs
            WHERE status = 'PENDING'
              AND (
                (next_retry_at IS NOT NULL AND next_retry_at <= ?)
                OR (next_retry_at IS NULL AND updated_at <= ?)
              )
            ORDER BY updated_at
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(now - STALE_PENDING_MS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn requeue_interrupted(&self) -> Result<Vec<JobDbModel>> {
        let jobs = sqlx::query_as::<_, JobDbModel>(
            "UPDATE translation_jobs SET status = 'PENDING', updated_at = ? \
             WHERE status = 'TRANSLATING' RETURNING *",
        )
        .bind(now_ms())
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<JobDbModel>> {
        let jobs = sqlx::query_as::<_, JobDbModel>(
            "SELECT * FROM translation_jobs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn count_by_status(&self) -> Result<JobCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM translation_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = JobCounts::default();
        for (status, count) in rows {
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => counts.pending = count as u64,
                Some(JobStatus::Translating) => counts.translating = count as u64,
                Some(JobStatus::Done) => counts.done = count as u64,
                Some(JobStatus::Failed) => counts.failed = count as u64,
                None => {}
            }
        }
        Ok(counts)
    }

    async fn delete_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM translation_jobs WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
