//! SRV3 codec.
//!
//! SRV3 is YouTube's XML timed-text format: `<p t="..." d="...">` blocks
//! inside a `<body>`, with `<s>` spans for styled runs and `<br>` line
//! breaks. The documents are shallow and regular, so parsing is a linear
//! scan rather than a full XML parser.

use crate::Result;
use crate::cue::Cue;

/// Parse an SRV3 document into cues.
///
/// Blocks with a missing or non-numeric `t`/`d` attribute are skipped.
/// Inside a block `<br>` becomes a newline, other tags are stripped and
/// entities are decoded.
pub fn parse(input: &str) -> Result<Vec<Cue>> {
    let mut cues = Vec::new();
    let mut rest = input;

    while let Some(open) = rest.find("<p") {
        // Require `<p ` or `<p>` so `<pre>` style tags don't match.
        let after = &rest[open + 2..];
        if !after.starts_with([' ', '\t', '\n', '>']) {
            rest = &rest[open + 2..];
            continue;
        }

        let Some(tag_end) = after.find('>') else {
            break;
        };
        let attrs = &after[..tag_end];
        let body_start = &after[tag_end + 1..];

        let Some(close) = body_start.find("</p>") else {
            rest = body_start;
            continue;
        };
        let body = &body_start[..close];
        rest = &body_start[close + 4..];

        let (Some(t), Some(d)) = (attr_value(attrs, "t"), attr_value(attrs, "d")) else {
            continue;
        };
        let (Ok(t), Ok(d)) = (t.parse::<i64>(), d.parse::<i64>()) else {
            continue;
        };
        if t < 0 || d <= 0 {
            continue;
        }

        let text = decode_entities(&strip_tags(body));
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        cues.push(Cue::new(t, t + d, text));
    }

    Ok(cues)
}

/// Render cues as an SRV3 document.
///
/// Bilingual cue text (containing a newline) is emitted as two `<s>` spans
/// separated by the encoded newline `&#x0A;`. Durations are clamped so that
/// `t + d + overlap_gap_ms <= next.t`, preventing the player from drawing
/// two blocks at once.
pub fn render(cues: &[Cue], overlap_gap_ms: i64) -> String {
    let mut out = String::with_capacity(cues.len() * 96 + 128);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" ?><timedtext format=\"3\"><body>");

    for (i, cue) in cues.iter().enumerate() {
        let mut duration = cue.duration_ms();
        if let Some(next) = cues.get(i + 1) {
            let max_end = next.start_ms - overlap_gap_ms;
            if cue.start_ms + duration > max_end {
                duration = (max_end - cue.start_ms).max(1);
            }
        }

        out.push_str(&format!("<p t=\"{}\" d=\"{}\">", cue.start_ms, duration));
        match cue.text.split_once('\n') {
            Some((original, translation)) => {
                out.push_str("<s>");
                out.push_str(&escape_xml(original));
                out.push_str("</s>&#x0A;<s>");
                out.push_str(&escape_xml(translation));
                out.push_str("</s>");
            }
            None => out.push_str(&escape_xml(&cue.text)),
        }
        out.push_str("</p>");
    }

    out.push_str("</body></timedtext>");
    out
}

/// Extract the value of `name="..."` from an attribute string.
fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = attrs;
    while let Some(pos) = rest.find(name) {
        let before_ok = pos == 0
            || rest[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_whitespace());
        let after = &rest[pos + name.len()..];
        if before_ok && after.trim_start().starts_with('=') {
            let after_eq = after.trim_start()[1..].trim_start();
            let quote = after_eq.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &after_eq[1..];
                return inner.find(quote).map(|end| &inner[..end]);
            }
        }
        rest = &rest[pos + name.len()..];
    }
    None
}

/// Replace `<br>` variants with newlines and drop every other tag.
fn strip_tags(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        match after.find('>') {
            Some(end) => {
                let tag = &after[1..end];
                let name = tag.trim_start_matches('/').trim_end_matches('/').trim();
                if name.eq_ignore_ascii_case("br") {
                    out.push('\n');
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated tag: keep the remainder as text.
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the named XML entity set plus numeric `&#N;` / `&#xN;` references.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let Some(semi) = after.find(';') else {
            out.push_str(after);
            rest = "";
            break;
        };
        let entity = &after[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            "nbsp" => out.push(' '),
            _ => {
                let decoded = entity.strip_prefix('#').and_then(|num| {
                    let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                });
                match decoded {
                    Some(c) => out.push(c),
                    None => out.push_str(&after[..semi + 1]),
                }
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    out
}

/// Escape special XML characters in a string.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let input = r#"<?xml version="1.0"?><timedtext format="3"><body>
            <p t="0" d="1000">Hello</p>
            <p t="1500" d="800">world</p>
        </body></timedtext>"#;
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(0, 1000, "Hello"));
        assert_eq!(cues[1], Cue::new(1500, 2300, "world"));
    }

    #[test]
    fn test_parse_br_and_spans() {
        let input = r#"<body><p t="0" d="1000"><s>line one</s><br/><s>line two</s></p></body>"#;
        let cues = parse(input).unwrap();
        assert_eq!(cues[0].text, "line one\nline two");
    }

    #[test]
    fn test_parse_entities() {
        let input = r#"<body><p t="0" d="1000">a &amp; b &lt;c&gt; &#65; &#x42;</p></body>"#;
        let cues = parse(input).unwrap();
        assert_eq!(cues[0].text, "a & b <c> A B");
    }

    #[test]
    fn test_parse_skips_bad_timing() {
        let input = r#"<body>
            <p d="1000">no start</p>
            <p t="abc" d="1000">bad start</p>
            <p t="0" d="0">zero duration</p>
            <p t="0" d="500">kept</p>
        </body>"#;
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "kept");
    }

    #[test]
    fn test_render_bilingual_spans() {
        let cues = vec![Cue::new(0, 2000, "original\n翻译")];
        let doc = render(&cues, 100);
        assert!(doc.contains("<s>original</s>&#x0A;<s>翻译</s>"));
    }

    #[test]
    fn test_render_clamps_overlap() {
        let cues = vec![Cue::new(0, 5000, "a"), Cue::new(3000, 6000, "b")];
        let doc = render(&cues, 100);
        // First block must end 100ms before the second starts: d = 2900.
        assert!(doc.contains(r#"<p t="0" d="2900">"#));
        let parsed = parse(&doc).unwrap();
        assert!(parsed[0].end_ms + 100 <= parsed[1].start_ms);
    }

    #[test]
    fn test_roundtrip() {
        let cues = vec![
            Cue::new(0, 1000, "one & two"),
            Cue::new(2000, 3000, "second\nline"),
        ];
        let doc = render(&cues, 100);
        let parsed = parse(&doc).unwrap();
        assert_eq!(cues, parsed);
    }
}
