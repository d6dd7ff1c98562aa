//! Admin introspection route, guarded by a bearer token.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::database::models::{JobCounts, JobDbModel};
use crate::database::repositories::CacheCounters;
use crate::database::time::ms_to_datetime;

/// Jobs included in the recent-jobs window.
const RECENT_JOBS_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub jobs: JobCounts,
    pub cache: CacheCounters,
    pub in_flight: usize,
    pub recent_jobs: Vec<JobSummary>,
}

/// A job row without its bilingual payload.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub video_id: String,
    pub lang: String,
    pub tlang: String,
    pub track: String,
    pub fmt: String,
    pub status: String,
    pub retry_count: i64,
    pub error_code: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobDbModel> for JobSummary {
    fn from(job: JobDbModel) -> Self {
        Self {
            id: job.id,
            video_id: job.video_id,
            lang: job.lang,
            tlang: job.tlang,
            track: job.track,
            fmt: job.fmt,
            status: job.status,
            retry_count: job.retry_count,
            error_code: job.error_code,
            created_at: ms_to_datetime(job.created_at).to_rfc3339(),
            updated_at: ms_to_datetime(job.updated_at).to_rfc3339(),
        }
    }
}

/// GET /admin/stats
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatsResponse>> {
    authorize(&state, &headers)?;

    let services = &state.services;
    let jobs = services.jobs.count_by_status().await?;
    let cache = services.metadata.counters().await?;
    let recent = services.jobs.list_recent_jobs(RECENT_JOBS_LIMIT).await?;

    Ok(Json(StatsResponse {
        jobs,
        cache,
        in_flight: services.in_flight.len(),
        recent_jobs: recent.into_iter().map(JobSummary::from).collect(),
    }))
}

/// Check `Authorization: Bearer <token>` against the configured admin token.
///
/// An instance without a configured token keeps the endpoint closed.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.services.config.admin_token.as_deref() else {
        return Err(ApiError::unauthorized("Admin endpoint is not enabled"));
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::unauthorized("Invalid or missing bearer token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_summary_drops_payload() {
        let json = serde_json::to_value(JobSummary {
            id: "id".into(),
            video_id: "dQw4w9WgXcQ".into(),
            lang: "en".into(),
            tlang: "zh-CN".into(),
            track: "asr".into(),
            fmt: "json3".into(),
            status: "DONE".into(),
            retry_count: 0,
            error_code: None,
            created_at: "2026-01-01T00:00:00+00:00".into(),
            updated_at: "2026-01-01T00:00:00+00:00".into(),
        })
        .unwrap();
        assert!(json.get("bilingual").is_none());
        assert_eq!(json["status"], "DONE");
    }
}
