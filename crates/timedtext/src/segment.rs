//! Paragraph segmentation.
//!
//! Auto-captioned tracks arrive as one word per cue. This module fuses them
//! into paragraph-level cues sized for a bilingual overlay, then adjusts
//! display times so short cues stay readable.

use crate::cue::Cue;

/// Tuning knobs for the segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// A paragraph is not closed at a sentence boundary before it has been
    /// on screen at least this long.
    pub min_duration_ms: i64,
    /// A paragraph is force-closed once including the next cue would make it
    /// this long.
    pub max_duration_ms: i64,
    /// A silence gap larger than this closes the open paragraph.
    pub gap_threshold_ms: i64,
    /// Soft character budget; 0 disables.
    pub max_chars: usize,
    /// Soft word budget; 0 disables.
    pub max_words: usize,
    /// Minimum gap kept between adjacent cues by the timing pass.
    pub overlap_gap_ms: i64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 3000,
            max_duration_ms: 7000,
            gap_threshold_ms: 1200,
            max_chars: 0,
            max_words: 0,
            overlap_gap_ms: 100,
        }
    }
}

/// Sentence-terminating punctuation, ASCII and CJK.
const TERMINALS: [char; 8] = ['.', '!', '?', '…', '。', '！', '？', '⋯'];

struct Paragraph {
    start_ms: i64,
    end_ms: i64,
    pieces: Vec<String>,
    chars: usize,
    words: usize,
}

impl Paragraph {
    fn open(cue: &Cue, text: &str) -> Self {
        Self {
            start_ms: cue.start_ms,
            end_ms: cue.end_ms,
            pieces: vec![text.to_string()],
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }

    fn push(&mut self, cue: &Cue, text: &str) {
        self.end_ms = self.end_ms.max(cue.end_ms);
        self.chars += text.chars().count();
        self.words += text.split_whitespace().count();
        self.pieces.push(text.to_string());
    }

    fn into_cue(self) -> Cue {
        Cue::new(self.start_ms, self.end_ms, join_pieces(&self.pieces))
    }
}

/// Fuse fine-grained cues into paragraph-level cues.
///
/// For a fixed config the output is a pure function of the input sequence.
pub fn segment_cues(cues: &[Cue], config: &SegmenterConfig) -> Vec<Cue> {
    let mut out: Vec<Cue> = Vec::new();
    let mut open: Option<Paragraph> = None;

    for cue in cues {
        let text = cue.text.trim();
        if text.is_empty() {
            continue;
        }

        let Some(mut para) = open.take() else {
            open = Some(Paragraph::open(cue, text));
            continue;
        };

        let duration_if_included = cue.end_ms - para.start_ms;
        let gap = cue.start_ms - para.end_ms;

        if duration_if_included >= config.max_duration_ms || gap > config.gap_threshold_ms {
            // Hard break: close the paragraph, this cue opens the next one.
            out.push(para.into_cue());
            open = Some(Paragraph::open(cue, text));
            continue;
        }

        para.push(cue, text);

        let duration = para.end_ms - para.start_ms;
        let at_sentence_end = text.chars().next_back().is_some_and(|c| TERMINALS.contains(&c));
        let over_chars = config.max_chars > 0 && para.chars >= config.max_chars;
        let over_words = config.max_words > 0 && para.words >= config.max_words;

        if duration >= config.min_duration_ms && (at_sentence_end || over_chars || over_words) {
            out.push(para.into_cue());
        } else {
            open = Some(para);
        }
    }

    if let Some(para) = open {
        let short_tail = para.end_ms - para.start_ms < config.min_duration_ms;
        match out.last_mut() {
            Some(prev) if short_tail => {
                // Fold a short tail into its predecessor.
                prev.end_ms = prev.end_ms.max(para.end_ms);
                prev.text.push(' ');
                prev.text.push_str(&join_pieces(&para.pieces));
                let joined = normalize_joined(&prev.text);
                prev.text = joined;
            }
            _ => out.push(para.into_cue()),
        }
    }

    out
}

/// Give every cue at least one second of display time when the following cue
/// allows it, with an absolute floor of 500 ms.
pub fn optimize_timing(cues: &mut [Cue]) {
    const TARGET_MS: i64 = 1000;
    const FLOOR_MS: i64 = 500;
    const PADDING_MS: i64 = 100;

    for i in 0..cues.len() {
        if cues[i].duration_ms() >= TARGET_MS {
            continue;
        }

        let wanted_end = cues[i].start_ms + TARGET_MS;
        let limit = cues
            .get(i + 1)
            .map(|next| next.start_ms - PADDING_MS)
            .unwrap_or(wanted_end);

        let new_end = wanted_end.min(limit).max(cues[i].start_ms + FLOOR_MS);
        cues[i].end_ms = cues[i].end_ms.max(new_end);
    }
}

/// Space-join word pieces, then tidy the punctuation spacing.
fn join_pieces(pieces: &[String]) -> String {
    normalize_joined(&pieces.join(" "))
}

/// Closing punctuation that never takes a leading space.
const CLOSING: [char; 16] = [
    ',', '.', ';', ':', '!', '?', '。', '！', '？', '；', '：', ')', ']', '」', '』', '”',
];

/// Opening brackets and quotes that never take a trailing space.
const OPENING: [char; 6] = ['(', '[', '「', '『', '“', '‘'];

fn normalize_joined(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let after_opening = out.chars().next_back().is_some_and(|p| OPENING.contains(&p));
            if !CLOSING.contains(&c) && !after_opening && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(c);
    }

    out
}
