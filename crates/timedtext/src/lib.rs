//! # Timedtext
//!
//! This crate handles the three subtitle wire formats served by YouTube's
//! timed-text endpoint and the paragraph segmentation used to fuse
//! word-level caption events into readable blocks.
//!
//! - JSON3: JSON events with inner text segments
//! - SRV3: XML with `<p>` timing blocks and `<s>` spans
//! - WebVTT: the standard text format
//!
//! All codecs parse into the shared [`Cue`] representation and render back
//! from it, so format conversion is parse-then-render.

use thiserror::Error;

pub mod cue;
pub mod json3;
pub mod segment;
pub mod srv3;
pub mod vtt;

pub use cue::{Cue, Format};
pub use segment::{SegmenterConfig, optimize_timing, segment_cues};

/// Common error type for codec operations.
#[derive(Error, Debug)]
pub enum TimedTextError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, TimedTextError>;

/// Detect the wire format of a raw timed-text document.
///
/// JSON3 documents start with `{`, WebVTT documents with the `WEBVTT`
/// header; everything else is treated as SRV3 XML.
pub fn sniff(input: &str) -> Format {
    let trimmed = input.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('{') {
        Format::Json3
    } else if trimmed.starts_with("WEBVTT") {
        Format::Vtt
    } else {
        Format::Srv3
    }
}

/// Parse a document in the given format into cues.
pub fn parse(format: Format, input: &str) -> Result<Vec<Cue>> {
    match format {
        Format::Json3 => json3::parse(input),
        Format::Srv3 => srv3::parse(input),
        Format::Vtt => vtt::parse(input),
    }
}

/// Render cues into the given format.
///
/// `overlap_gap_ms` is only consulted by the SRV3 renderer, which clamps
/// durations so adjacent blocks never draw simultaneously.
pub fn render(format: Format, cues: &[Cue], overlap_gap_ms: i64) -> String {
    match format {
        Format::Json3 => json3::render(cues),
        Format::Srv3 => srv3::render(cues, overlap_gap_ms),
        Format::Vtt => vtt::render(cues),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_json3() {
        assert_eq!(sniff(r#"{"events":[]}"#), Format::Json3);
        assert_eq!(sniff("  \n{\"events\":[]}"), Format::Json3);
    }

    #[test]
    fn test_sniff_vtt() {
        assert_eq!(sniff("WEBVTT\n\n00:00.000 --> 00:01.000\nhi"), Format::Vtt);
    }

    #[test]
    fn test_sniff_srv3_fallback() {
        assert_eq!(sniff("<timedtext format=\"3\"></timedtext>"), Format::Srv3);
        assert_eq!(sniff(""), Format::Srv3);
    }

    #[test]
    fn test_sniff_strips_bom() {
        assert_eq!(sniff("\u{feff}{\"events\":[]}"), Format::Json3);
    }

    #[test]
    fn test_cross_format_conversion() {
        let cues = vec![
            Cue::new(0, 2000, "first line"),
            Cue::new(2500, 5000, "second line"),
        ];
        let vtt_doc = render(Format::Vtt, &cues, 100);
        let parsed = parse(Format::Vtt, &vtt_doc).unwrap();
        let json_doc = render(Format::Json3, &parsed, 100);
        let roundtripped = parse(Format::Json3, &json_doc).unwrap();
        assert_eq!(cues, roundtripped);
    }
}
