//! Translation job database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use timedtext::Format;

use crate::database::time::now_ms;

/// The semantic identity of a subtitle request.
///
/// Two requests with an equal key demand equal output. The source hash is
/// deliberately not part of the key: it disambiguates job rows when the
/// upstream track changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub video_id: String,
    pub lang: String,
    pub tlang: String,
    pub track: String,
    pub fmt: String,
}

impl JobKey {
    pub fn new(
        video_id: impl Into<String>,
        lang: impl Into<String>,
        tlang: impl Into<String>,
        track: impl Into<String>,
        fmt: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            lang: lang.into(),
            tlang: tlang.into(),
            track: track.into(),
            fmt: fmt.into(),
        }
    }

    /// Stable string form used as the memory-cache key.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.video_id, self.lang, self.tlang, self.track, self.fmt
        )
    }

    /// The wire format the client asked for.
    pub fn format(&self) -> Format {
        Format::parse(&self.fmt).unwrap_or(Format::Json3)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Job status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is queued and waiting to be picked up by the worker.
    Pending,
    /// Job is currently being translated.
    Translating,
    /// Job finished successfully; `bilingual` is populated.
    Done,
    /// Job failed after exhausting retries.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Translating => "TRANSLATING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "TRANSLATING" => Some(Self::Translating),
            "DONE" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: u64,
    pub translating: u64,
    pub done: u64,
    pub failed: u64,
}

impl JobCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.translating + self.done + self.failed
    }
}

/// Translation job database model.
///
/// One row per (request key, source hash); the composite unique index makes
/// duplicate creation a no-op.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: String,
    pub video_id: String,
    pub lang: String,
    pub tlang: String,
    pub track: String,
    pub fmt: String,
    /// Fingerprint of the canonicalized upstream cues.
    pub source_hash: String,
    /// Status: PENDING, TRANSLATING, DONE, FAILED
    pub status: String,
    pub retry_count: i64,
    /// Epoch ms of the next allowed attempt; set only while a retry remains.
    pub next_retry_at: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Rendered bilingual WebVTT once status is DONE.
    pub bilingual: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

impl JobDbModel {
    pub fn new(key: &JobKey, source_hash: impl Into<String>, ttl_ms: i64) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            video_id: key.video_id.clone(),
            lang: key.lang.clone(),
            tlang: key.tlang.clone(),
            track: key.track.clone(),
            fmt: key.fmt.clone(),
            source_hash: source_hash.into(),
            status: JobStatus::Pending.as_str().to_string(),
            retry_count: 0,
            next_retry_at: None,
            error_code: None,
            error_message: None,
            bilingual: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl_ms,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.video_id, &self.lang, &self.tlang, &self.track, &self.fmt)
    }

    pub fn get_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    /// Mark the job as picked up by the worker.
    pub fn mark_translating(&mut self) {
        self.status = JobStatus::Translating.as_str().to_string();
        self.updated_at = now_ms();
    }

    /// Mark the job as completed with its bilingual payload.
    pub fn mark_done(&mut self, bilingual: impl Into<String>) {
        self.status = JobStatus::Done.as_str().to_string();
        self.bilingual = Some(bilingual.into());
        self.next_retry_at = None;
        self.error_code = None;
        self.error_message = None;
        self.updated_at = now_ms();
    }

    /// Mark the job as terminally failed.
    pub fn mark_failed(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.status = JobStatus::Failed.as_str().to_string();
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self.next_retry_at = None;
        self.updated_at = now_ms();
    }

    /// Record a failed attempt and schedule the next one.
    ///
    /// The job goes back to PENDING with `next_retry_at = now + delay` and an
    /// incremented retry count.
    pub fn schedule_retry(
        &mut self,
        delay_ms: i64,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        let now = now_ms();
        self.status = JobStatus::Pending.as_str().to_string();
        self.retry_count += 1;
        self.next_retry_at = Some(now + delay_ms);
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self.updated_at = now;
    }
}
