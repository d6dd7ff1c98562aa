//! WebVTT codec.
//!
//! This is the storage format for finished bilingual tracks, so the parser
//! accepts everything the renderer emits plus the looser documents YouTube
//! serves (optional cue identifiers, cue settings after the timing line,
//! `MM:SS.mmm` short timestamps).

use crate::Result;
use crate::cue::Cue;

/// Parse a WebVTT document into cues.
///
/// The `WEBVTT` header block and `NOTE` blocks are skipped; blocks without
/// a timing line or with empty text are ignored.
pub fn parse(input: &str) -> Result<Vec<Cue>> {
    let normalized = input.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() || block.starts_with("WEBVTT") || block.starts_with("NOTE") {
            continue;
        }

        let lines: Vec<&str> = block.lines().collect();
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let Some((start_ms, end_ms)) = parse_timing_line(lines[timing_idx]) else {
            continue;
        };
        if end_ms <= start_ms {
            continue;
        }

        let text = lines[timing_idx + 1..].join("\n");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        cues.push(Cue::new(start_ms, end_ms, text));
    }

    Ok(cues)
}

/// Render cues as a WebVTT document with sequential numeric identifiers.
pub fn render(cues: &[Cue]) -> String {
    let mut out = String::with_capacity(cues.len() * 64 + 16);
    out.push_str("WEBVTT\n\n");

    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        ));
    }

    out
}

/// Parse `<start> --> <end> [settings]` into a millisecond pair.
fn parse_timing_line(line: &str) -> Option<(i64, i64)> {
    let (start, rest) = line.split_once("-->")?;
    // Cue settings ("align:start position:0%") follow the end timestamp
    // after whitespace.
    let end = rest.trim().split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` into milliseconds.
fn parse_timestamp(ts: &str) -> Option<i64> {
    let (clock, millis) = ts.split_once(['.', ','])?;
    let millis: i64 = millis.parse().ok()?;

    let parts: Vec<&str> = clock.split(':').collect();
    let (h, m, s): (i64, i64, i64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };

    Some(((h * 60 + m) * 60 + s) * 1000 + millis)
}

/// Format milliseconds as `HH:MM:SS.mmm`.
fn format_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{h:02}:{m:02}:{s:02}.{millis:03}")
}
