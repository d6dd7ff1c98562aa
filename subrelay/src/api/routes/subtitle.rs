//! The subtitle proxy endpoint.
//!
//! The contract with the client (a URL rewriter with a hard script timeout)
//! is: always answer fast. A cache hit returns the bilingual track in the
//! requested format; a miss returns the upstream bytes unchanged and kicks
//! off a background translation when none is in flight.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::database::models::{JobDbModel, JobKey};
use crate::fetcher::source_hash;
use crate::worker::TranslationJob;
use timedtext::Format;

/// Advisory seconds until a fresh translation is likely ready.
const ESTIMATED_TRANSLATION_SECS: &str = "30";

#[derive(Debug, Deserialize)]
pub struct SubtitleQuery {
    /// Video id, `[A-Za-z0-9_-]{11}`.
    pub v: String,
    /// Source language tag.
    pub lang: String,
    /// Target language tag; defaults to the configured target.
    pub tlang: Option<String>,
    /// Track kind; YouTube uses `asr` for auto captions.
    pub kind: Option<String>,
    /// Requested wire format.
    pub fmt: Option<String>,
    /// Pass-through upstream URL, used verbatim when present.
    pub original_url: Option<String>,
}

/// GET /api/subtitle (alias /api/timedtext)
pub async fn handle(
    State(state): State<AppState>,
    Query(query): Query<SubtitleQuery>,
) -> ApiResult<Response> {
    let key = validate(&state, &query)?;

    // Fast path: a finished bilingual track under this key.
    if let Some((bilingual, layer)) = state.services.cache.get(&key).await? {
        debug!(key = %key, ?layer, "Cache hit");
        let overlap_gap_ms = state.services.config.segmenter.overlap_gap_ms;
        return respond_completed(&key, &bilingual, overlap_gap_ms);
    }

    // Miss: fetch upstream now so the client gets the original immediately.
    let fetched = state
        .services
        .fetcher
        .fetch(&key, query.original_url.as_deref())
        .await?;
    let hash = source_hash(&fetched.cues);

    maybe_enqueue(&state, &key, &hash, &fetched.cues).await?;

    Ok((
        StatusCode::OK,
        [
            ("content-type", fetched.format.content_type().to_string()),
            ("x-translation-status", "pending".to_string()),
            ("x-cache-status", "MISS".to_string()),
            ("x-video-id", key.video_id.clone()),
            ("x-estimated-time", ESTIMATED_TRANSLATION_SECS.to_string()),
        ],
        fetched.raw,
    )
        .into_response())
}

/// Validate the query and assemble the request key.
fn validate(state: &AppState, query: &SubtitleQuery) -> Result<JobKey, ApiError> {
    if !is_valid_video_id(&query.v) {
        return Err(ApiError::bad_request(
            "invalid_video_id",
            "Video id must be 11 characters of [A-Za-z0-9_-]",
        ));
    }

    let tlang = query
        .tlang
        .clone()
        .unwrap_or_else(|| state.services.config.target_lang.clone());
    for lang in [&query.lang, &tlang] {
        if !is_valid_language(lang) {
            return Err(ApiError::bad_request(
                "invalid_language",
                format!("Invalid language tag: {lang}"),
            ));
        }
    }

    let fmt = match &query.fmt {
        Some(fmt) => Format::parse(fmt)
            .ok_or_else(|| {
                ApiError::bad_request("invalid_format", format!("Unknown format: {fmt}"))
            })?
            .as_str()
            .to_string(),
        None => Format::Json3.as_str().to_string(),
    };

    let track = query.kind.clone().unwrap_or_else(|| "asr".to_string());

    Ok(JobKey::new(&query.v, &query.lang, tlang, track, fmt))
}

fn is_valid_video_id(v: &str) -> bool {
    v.len() == 11
        && v.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_language(lang: &str) -> bool {
    !lang.is_empty()
        && lang.len() <= 10
        && lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
}

/// Serve a finished track, re-rendered into the requested format.
fn respond_completed(key: &JobKey, bilingual: &str, overlap_gap_ms: i64) -> ApiResult<Response> {
    let format = key.format();
    let cues = timedtext::parse(Format::Vtt, bilingual)
        .map_err(|e| ApiError::internal(format!("cached track unreadable: {e}")))?;
    let body = timedtext::render(format, &cues, overlap_gap_ms);

    Ok((
        StatusCode::OK,
        [
            ("content-type", format.content_type().to_string()),
            ("x-translation-status", "completed".to_string()),
            ("x-cache-status", "HIT".to_string()),
            ("x-video-id", key.video_id.clone()),
        ],
        body,
    )
        .into_response())
}

/// Create and enqueue a job unless one is already active for this
/// (key, source hash).
async fn maybe_enqueue(
    state: &AppState,
    key: &JobKey,
    hash: &str,
    cues: &[timedtext::Cue],
) -> Result<(), ApiError> {
    let services = &state.services;

    if services.jobs.find_active(key, hash).await?.is_some() {
        debug!(key = %key, "Active job exists, not enqueueing");
        return Ok(());
    }

    // The in-flight set is the fast guard against concurrent identical
    // misses; the store's unique index catches the stragglers.
    if !services.in_flight.insert(key, hash) {
        debug!(key = %key, "Job already in flight");
        return Ok(());
    }

    let row = JobDbModel::new(key, hash, services.config.cache.ttl_ms());
    let inserted = match services.jobs.create_job(&row).await {
        Ok(inserted) => inserted,
        Err(e) => {
            services.in_flight.remove(key, hash);
            return Err(e.into());
        }
    };

    if !inserted {
        // Lost the race to another request; its job carries the work.
        services.in_flight.remove(key, hash);
        return Ok(());
    }

    info!(key = %key, job_id = %row.id, "Enqueueing translation job");
    let enqueued = services.worker.enqueue(TranslationJob {
        job_id: row.id,
        key: key.clone(),
        source_hash: hash.to_string(),
        cues: Some(cues.to_vec()),
    });
    if !enqueued {
        // Row stays PENDING; the retry scan will pick it up.
        services.in_flight.remove(key, hash);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_validation() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(is_valid_video_id("abc-DEF_123"));
        assert!(!is_valid_video_id("short"));
        assert!(!is_valid_video_id("waytoolongvideoid"));
        assert!(!is_valid_video_id("bad!chars!!"));
    }

    #[test]
    fn test_language_validation() {
        assert!(is_valid_language("en"));
        assert!(is_valid_language("zh-CN"));
        assert!(is_valid_language("pt-BR"));
        assert!(!is_valid_language(""));
        assert!(!is_valid_language("overlylonglang"));
        assert!(!is_valid_language("en_US"));
        assert!(!is_valid_language("zh;CN"));
    }
}
