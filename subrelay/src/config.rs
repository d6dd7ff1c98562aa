//! Environment-derived configuration.
//!
//! Every knob reads a `SUBRELAY_*` environment variable and falls back to a
//! default that works out of the box (the database URL keeps the
//! conventional `DATABASE_URL` name). Parsing never fails: malformed values
//! fall back to the default with a warning.

use std::time::Duration;

use timedtext::SegmenterConfig;
use tracing::warn;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

/// LLM chat-completion endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Whole-transcript guidance (summary and glossary) toggles.
#[derive(Debug, Clone)]
pub struct GuidanceConfig {
    pub summary_enabled: bool,
    pub summary_max_tokens: u32,
    pub summary_chunk_chars: usize,
    pub glossary_enabled: bool,
    pub glossary_max_tokens: u32,
    pub glossary_chunk_chars: usize,
}

/// Context-aware batched translation tuning.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub preceding_lines: usize,
    pub following_lines: usize,
    pub concurrency: usize,
    pub batch_retries: u32,
    pub max_tokens: u32,
}

/// Translation job queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_retries: i64,
    pub retry_base_ms: i64,
}

/// Cache sizing and retention.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_hours: i64,
    pub lru_max_items: usize,
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_hours * 3_600_000
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub llm: LlmConfig,
    pub guidance: GuidanceConfig,
    pub context: ContextConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub segmenter: SegmenterConfig,
    pub upstream_timeout: Duration,
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                bind_address: env_string("SUBRELAY_BIND", "0.0.0.0"),
                port: env_or("SUBRELAY_PORT", 8080),
            },
            database_url: env_string("DATABASE_URL", "sqlite:subrelay.db?mode=rwc"),
            source_lang: env_string("SUBRELAY_SOURCE_LANG", "en"),
            target_lang: env_string("SUBRELAY_TARGET_LANG", "zh-CN"),
            llm: LlmConfig {
                base_url: env_string("SUBRELAY_LLM_BASE_URL", "https://api.openai.com"),
                model: env_string("SUBRELAY_LLM_MODEL", "gpt-4o-mini"),
                api_key: env_string("SUBRELAY_LLM_API_KEY", ""),
                timeout: Duration::from_secs(env_or("SUBRELAY_LLM_TIMEOUT_SECS", 60)),
                max_retries: env_or("SUBRELAY_LLM_MAX_RETRIES", 2),
            },
            guidance: GuidanceConfig {
                summary_enabled: env_or("SUBRELAY_SUMMARY_ENABLED", true),
                summary_max_tokens: env_or("SUBRELAY_SUMMARY_MAX_TOKENS", 512),
                summary_chunk_chars: env_or("SUBRELAY_SUMMARY_CHUNK_CHARS", 6000),
                glossary_enabled: env_or("SUBRELAY_GLOSSARY_ENABLED", true),
                glossary_max_tokens: env_or("SUBRELAY_GLOSSARY_MAX_TOKENS", 768),
                glossary_chunk_chars: env_or("SUBRELAY_GLOSSARY_CHUNK_CHARS", 6000),
            },
            context: ContextConfig {
                enabled: env_or("SUBRELAY_CONTEXT_ENABLED", true),
                batch_size: env_or("SUBRELAY_CONTEXT_BATCH_SIZE", 6),
                preceding_lines: env_or("SUBRELAY_CONTEXT_PRECEDING_LINES", 3),
                following_lines: env_or("SUBRELAY_CONTEXT_FOLLOWING_LINES", 2),
                concurrency: env_or("SUBRELAY_CONTEXT_CONCURRENCY", 3),
                batch_retries: env_or("SUBRELAY_CONTEXT_BATCH_RETRIES", 2),
                max_tokens: env_or("SUBRELAY_CONTEXT_MAX_TOKENS", 1024),
            },
            queue: QueueConfig {
                concurrency: env_or("SUBRELAY_QUEUE_CONCURRENCY", 2),
                max_retries: env_or("SUBRELAY_QUEUE_MAX_RETRIES", 3),
                retry_base_ms: env_or("SUBRELAY_QUEUE_RETRY_BASE_MS", 5000),
            },
            cache: CacheConfig {
                ttl_hours: env_or("SUBRELAY_CACHE_TTL_HOURS", 720),
                lru_max_items: env_or("SUBRELAY_CACHE_LRU_MAX_ITEMS", 1000),
                cleanup_interval: Duration::from_millis(env_or(
                    "SUBRELAY_CLEANUP_INTERVAL_MS",
                    3_600_000,
                )),
            },
            segmenter: SegmenterConfig {
                min_duration_ms: env_or("SUBRELAY_SEGMENT_MIN_DURATION_MS", 3000),
                max_duration_ms: env_or("SUBRELAY_SEGMENT_MAX_DURATION_MS", 7000),
                gap_threshold_ms: env_or("SUBRELAY_SEGMENT_GAP_MS", 1200),
                max_chars: env_or("SUBRELAY_SEGMENT_MAX_CHARS", 0),
                max_words: env_or("SUBRELAY_SEGMENT_MAX_WORDS", 0),
                overlap_gap_ms: env_or("SUBRELAY_SRV3_OVERLAP_GAP_MS", 100),
            },
            upstream_timeout: Duration::from_secs(env_or("SUBRELAY_UPSTREAM_TIMEOUT_SECS", 5)),
            admin_token: env_opt("SUBRELAY_ADMIN_TOKEN"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
