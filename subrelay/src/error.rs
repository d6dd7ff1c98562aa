//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] timedtext::TimedTextError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream fetch timed out")]
    UpstreamTimeout,

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Upstream returned an empty document")]
    UpstreamEmpty,

    #[error("Upstream fetch failed: {0}")]
    UpstreamNetwork(String),

    #[error("Upstream source changed: {0}")]
    SourceChanged(String),

    #[error("Translation error: {0}")]
    Translation(#[from] crate::translator::LlmError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error came from the upstream timed-text fetch.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout
                | Self::UpstreamStatus(_)
                | Self::UpstreamEmpty
                | Self::UpstreamNetwork(_)
        )
    }

    /// Machine-readable code recorded on failed job rows.
    pub fn job_error_code(&self) -> &'static str {
        match self {
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamStatus(_) => "upstream_status",
            Self::UpstreamEmpty | Self::UpstreamNetwork(_) => "youtube_api_error",
            Self::SourceChanged(_) => "source_changed",
            Self::Translation(e) => e.code(),
            Self::Codec(_) => "codec_error",
            Self::DatabaseSqlx(_) | Self::Migration(_) => "database_error",
            _ => "translation_error",
        }
    }
}
