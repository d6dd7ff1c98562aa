//! End-to-end shape of the translation pipeline, minus the LLM.
//!
//! Exercises the same steps the worker runs: segment the raw word-level
//! cues, optimize timing, attach translations, render the storage format
//! and re-render the client formats from it.

use timedtext::{Cue, Format, SegmenterConfig};

fn word_track() -> Vec<Cue> {
    vec![
        Cue::new(0, 500, "I"),
        Cue::new(500, 1000, "have"),
        Cue::new(1000, 1500, "a"),
        Cue::new(1500, 2000, "dream."),
        Cue::new(4000, 4500, "Next"),
        Cue::new(4500, 5000, "line"),
    ]
}

fn attach_translations(cues: &[Cue]) -> Vec<Cue> {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| Cue::new(cue.start_ms, cue.end_ms, format!("{}\n译文{}", cue.text, i)))
        .collect()
}

#[test]
fn test_worker_pipeline_shape() {
    let config = SegmenterConfig {
        gap_threshold_ms: 1000,
        min_duration_ms: 0,
        ..Default::default()
    };

    let mut segmented = timedtext::segment_cues(&word_track(), &config);
    timedtext::optimize_timing(&mut segmented);
    assert_eq!(segmented.len(), 2);
    assert_eq!(segmented[0].text, "I have a dream.");

    let bilingual = attach_translations(&segmented);
    let vtt = timedtext::render(Format::Vtt, &bilingual, config.overlap_gap_ms);

    // The stored form round-trips.
    let reparsed = timedtext::parse(Format::Vtt, &vtt).unwrap();
    assert_eq!(reparsed, bilingual);

    // Edge re-rendering into each client format keeps every cue.
    for fmt in [Format::Json3, Format::Srv3, Format::Vtt] {
        let body = timedtext::render(fmt, &reparsed, config.overlap_gap_ms);
        let cues = timedtext::parse(fmt, &body).unwrap();
        assert_eq!(cues.len(), bilingual.len(), "{fmt} lost cues");
        for (cue, original) in cues.iter().zip(&bilingual) {
            assert!(cue.text.contains(original.text.split('\n').next().unwrap()));
            assert!(cue.text.contains("译文"));
        }
    }
}

#[test]
fn test_srv3_edge_render_never_overlaps() {
    let overlap_gap_ms = 100;
    let bilingual = vec![
        Cue::new(0, 3000, "first\n第一"),
        Cue::new(2950, 6000, "second\n第二"),
        Cue::new(5800, 9000, "third\n第三"),
    ];

    let srv3 = timedtext::render(Format::Srv3, &bilingual, overlap_gap_ms);
    let parsed = timedtext::parse(Format::Srv3, &srv3).unwrap();
    for pair in parsed.windows(2) {
        assert!(pair[0].end_ms + overlap_gap_ms <= pair[1].start_ms);
    }
}

#[test]
fn test_sniff_matches_upstream_variants() {
    let cues = vec![Cue::new(0, 1000, "hi")];
    for fmt in [Format::Json3, Format::Srv3, Format::Vtt] {
        let body = timedtext::render(fmt, &cues, 100);
        assert_eq!(timedtext::sniff(&body), fmt);
    }
}
