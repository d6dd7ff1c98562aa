//! Metadata repository.
//!
//! A tiny key/value table used for monotonic counters (`cache_hits`,
//! `cache_misses`) and the schema's `cache_version` marker.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::Result;

/// Cache hit/miss counters read from the metadata table.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheCounters {
    pub hits: i64,
    pub misses: i64,
}

impl CacheCounters {
    /// Hit rate in [0, 1]; 0 when no lookups happened yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Metadata repository trait.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically increment an integer-valued key, creating it at 1.
    async fn increment(&self, key: &str) -> Result<i64>;

    async fn counters(&self) -> Result<CacheCounters>;
}

/// SQLx implementation of MetadataRepository.
pub struct SqlxMetadataRepository {
    pool: SqlitePool,
}

impl SqlxMetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataRepository for SqlxMetadataRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let row: (String,) = sqlx::query_as(
            r#"
            INSERT INTO metadata (key, value) VALUES (?, '1')
            ON CONFLICT (key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.parse().unwrap_or(0))
    }

    async fn counters(&self) -> Result<CacheCounters> {
        let hits = self
            .get("cache_hits")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let misses = self
            .get("cache_misses")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(CacheCounters { hits, misses })
    }
}
