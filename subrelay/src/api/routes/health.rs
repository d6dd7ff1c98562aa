//! Health check route.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::database::models::JobCounts;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: DatabaseHealth,
    pub cache: CacheHealth,
    pub queue: JobCounts,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub hits: i64,
    pub misses: i64,
    pub hit_rate: f64,
    pub memory_entries: usize,
}

/// GET /health
pub async fn handle(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let services = &state.services;
    let uptime = state.start_time.elapsed().as_secs();

    let connected = sqlx::query("SELECT 1")
        .execute(&services.pool)
        .await
        .is_ok();

    let counters = services.metadata.counters().await.unwrap_or_default();
    let queue = services.jobs.count_by_status().await.unwrap_or_default();

    Ok(Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
        database: DatabaseHealth { connected },
        cache: CacheHealth {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate: counters.hit_rate(),
            memory_entries: services.cache.memory_entries(),
        },
        queue,
    }))
}
