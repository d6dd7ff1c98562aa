//! Upstream timed-text fetcher.
//!
//! Fetches the original track from YouTube's timedtext endpoint (or a
//! passed-through URL), sniffs the wire format and normalizes it into the
//! internal cue list. The raw body is kept so the dispatcher can reply to
//! the client without re-rendering.

use std::time::Duration;

use timedtext::{Cue, Format};
use tracing::debug;

use crate::database::models::JobKey;
use crate::{Error, Result};

const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

/// Browser-like user agent; the endpoint rejects obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A fetched upstream track: the raw bytes for the immediate client reply
/// plus the normalized cues for the translation pipeline.
#[derive(Debug, Clone)]
pub struct FetchedSubtitle {
    pub raw: String,
    pub format: Format,
    pub cues: Vec<Cue>,
}

/// Upstream fetcher with a pooled client and a hard per-call timeout.
pub struct UpstreamFetcher {
    client: reqwest::Client,
}

impl UpstreamFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch and normalize the track for a request key.
    ///
    /// `original_url` overrides the standard timedtext URL when the client
    /// passed its own through.
    pub async fn fetch(&self, key: &JobKey, original_url: Option<&str>) -> Result<FetchedSubtitle> {
        let request = match original_url {
            Some(url) => self.client.get(url),
            None => self.client.get(TIMEDTEXT_URL).query(&[
                ("v", key.video_id.as_str()),
                ("lang", key.lang.as_str()),
                ("kind", key.track.as_str()),
                ("fmt", key.fmt.as_str()),
            ]),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout
            } else {
                Error::UpstreamNetwork(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }

        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout
            } else {
                Error::UpstreamNetwork(e.to_string())
            }
        })?;

        if raw.trim().is_empty() {
            return Err(Error::UpstreamEmpty);
        }

        let format = timedtext::sniff(&raw);
        let cues = timedtext::parse(format, &raw)?;
        debug!(key = %key, %format, cues = cues.len(), "Fetched upstream track");

        if cues.is_empty() {
            return Err(Error::UpstreamEmpty);
        }

        Ok(FetchedSubtitle { raw, format, cues })
    }
}

/// Deterministic fingerprint of a canonicalized cue list.
///
/// Hashing the parsed cues rather than the raw bytes makes the fingerprint
/// insensitive to upstream reformatting; blake3 keeps collisions out of the
/// picture on large corpora.
pub fn source_hash(cues: &[Cue]) -> String {
    let mut hasher = blake3::Hasher::new();
    for cue in cues {
        hasher.update(cue.start_ms.to_le_bytes().as_slice());
        hasher.update(cue.end_ms.to_le_bytes().as_slice());
        hasher.update(cue.text.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_hash_deterministic() {
        let cues = vec![Cue::new(0, 1000, "hello"), Cue::new(1000, 2000, "world")];
        assert_eq!(source_hash(&cues), source_hash(&cues.clone()));
    }

    #[test]
    fn test_source_hash_sensitive_to_content() {
        let a = vec![Cue::new(0, 1000, "hello")];
        let b = vec![Cue::new(0, 1000, "hellp")];
        let c = vec![Cue::new(0, 1001, "hello")];
        assert_ne!(source_hash(&a), source_hash(&b));
        assert_ne!(source_hash(&a), source_hash(&c));
    }

    #[test]
    fn test_source_hash_ignores_formatting() {
        // The same cues parsed out of different wire formats hash equally.
        let cues = vec![Cue::new(0, 1000, "same text")];
        let json = timedtext::render(Format::Json3, &cues, 100);
        let vtt = timedtext::render(Format::Vtt, &cues, 100);
        let from_json = timedtext::parse(Format::Json3, &json).unwrap();
        let from_vtt = timedtext::parse(Format::Vtt, &vtt).unwrap();
        assert_eq!(source_hash(&from_json), source_hash(&from_vtt));
    }
}
