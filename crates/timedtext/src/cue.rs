//! Core cue and format types shared by all codecs.

use serde::{Deserialize, Serialize};

/// A single timed-text record: a time range and the text displayed in it.
///
/// Bilingual cues carry the original line, a newline, and the translation
/// in `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in milliseconds from the beginning of the track.
    pub start_ms: i64,
    /// End time in milliseconds; always greater than `start_ms`.
    pub end_ms: i64,
    /// Cue text, non-empty after parsing.
    pub text: String,
}

impl Cue {
    pub fn new(start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Display duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// The three wire formats handled at the proxy's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json3,
    Srv3,
    Vtt,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json3 => "json3",
            Self::Srv3 => "srv3",
            Self::Vtt => "vtt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json3" => Some(Self::Json3),
            "srv3" => Some(Self::Srv3),
            "vtt" => Some(Self::Vtt),
            _ => None,
        }
    }

    /// The HTTP content type a document of this format is served with.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json3 => "application/json",
            Self::Srv3 => "text/xml; charset=utf-8",
            Self::Vtt => "text/vtt; charset=utf-8",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_duration() {
        let cue = Cue::new(1000, 3500, "hello");
        assert_eq!(cue.duration_ms(), 2500);
    }

    #[test]
    fn test_format_roundtrip() {
        for fmt in [Format::Json3, Format::Srv3, Format::Vtt] {
            assert_eq!(Format::parse(fmt.as_str()), Some(fmt));
        }
        assert_eq!(Format::parse("srt"), None);
    }
}
