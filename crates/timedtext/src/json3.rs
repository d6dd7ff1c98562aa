//! JSON3 codec.
//!
//! JSON3 is the JSON flavour of YouTube's timed text: a document with an
//! `events` array where each event carries `tStartMs`, `dDurationMs` and a
//! list of inner text segments (`segs`).

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::cue::Cue;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs")]
    t_start_ms: i64,
    #[serde(rename = "dDurationMs", default, skip_serializing_if = "Option::is_none")]
    d_duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segs: Option<Vec<Json3Segment>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Parse a JSON3 document into cues.
///
/// Events without segments, with empty concatenated text, or without a
/// positive duration are skipped.
pub fn parse(input: &str) -> Result<Vec<Cue>> {
    let doc: Json3Document = serde_json::from_str(input)?;

    let mut cues = Vec::with_capacity(doc.events.len());
    for event in doc.events {
        let Some(segs) = event.segs else {
            continue;
        };

        let text: String = segs.iter().map(|s| s.utf8.as_str()).collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let duration = event.d_duration_ms.unwrap_or(0);
        if event.t_start_ms < 0 || duration <= 0 {
            continue;
        }

        cues.push(Cue::new(
            event.t_start_ms,
            event.t_start_ms + duration,
            text,
        ));
    }

    Ok(cues)
}

/// Render cues as a JSON3 document, one event with a single segment per cue.
pub fn render(cues: &[Cue]) -> String {
    let doc = Json3Document {
        events: cues
            .iter()
            .map(|cue| Json3Event {
                t_start_ms: cue.start_ms,
                d_duration_ms: Some(cue.duration_ms()),
                segs: Some(vec![Json3Segment {
                    utf8: cue.text.clone(),
                }]),
            })
            .collect(),
    };

    // Serialization of a plain struct tree cannot fail.
    serde_json::to_string(&doc).unwrap_or_else(|_| r#"{"events":[]}"#.to_string())
}
