//! Structured-output parsing for LLM replies.
//!
//! Models wrap JSON in code fences or prose often enough that strict
//! `from_str` on the raw completion is a losing game; these helpers cut the
//! array out first and validate afterwards.

use serde::Deserialize;

use super::client::LlmError;

/// One translated line in a batch reply.
#[derive(Debug, Deserialize)]
pub struct BatchItem {
    pub id: i64,
    pub translation: String,
}

/// Locate the outermost JSON array in a completion.
///
/// Strips Markdown code fences first, then takes everything between the
/// first `[` and the last `]`.
pub fn extract_json_array(content: &str) -> Option<&str> {
    let stripped = strip_code_fences(content);
    let start = stripped.find('[')?;
    let end = stripped.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&stripped[start..=end])
}

/// Remove a surrounding ```/```json fence if present.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate a batch translation reply.
///
/// The reply must be a JSON array of `{id, translation}` whose ids are
/// exactly the absolute indices `expected_start..expected_start + expected_len`
/// (in any order) with non-empty translations. Any deviation fails the
/// batch.
pub fn parse_batch_response(
    content: &str,
    expected_start: usize,
    expected_len: usize,
) -> Result<Vec<String>, LlmError> {
    let array = extract_json_array(content)
        .ok_or_else(|| LlmError::Malformed("no JSON array in reply".into()))?;

    let items: Vec<BatchItem> =
        serde_json::from_str(array).map_err(|e| LlmError::Malformed(e.to_string()))?;

    if items.len() != expected_len {
        return Err(LlmError::Malformed(format!(
            "expected {} items, got {}",
            expected_len,
            items.len()
        )));
    }

    let mut slots: Vec<Option<String>> = vec![None; expected_len];
    for item in items {
        let Ok(id) = usize::try_from(item.id) else {
            return Err(LlmError::Malformed(format!("negative id {}", item.id)));
        };
        if id < expected_start || id >= expected_start + expected_len {
            return Err(LlmError::Malformed(format!("id {id} outside batch")));
        }
        let slot = &mut slots[id - expected_start];
        if slot.is_some() {
            return Err(LlmError::Malformed(format!("duplicate id {id}")));
        }
        let translation = item.translation.trim();
        if translation.is_empty() {
            return Err(LlmError::Malformed(format!("empty translation for id {id}")));
        }
        *slot = Some(translation.to_string());
    }

    // items.len() == expected_len and ids are unique and in range, so every
    // slot is filled.
    Ok(slots.into_iter().map(|s| s.unwrap_or_default()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_array() {
        assert_eq!(extract_json_array(r#"[1, 2]"#), Some("[1, 2]"));
    }

    #[test]
    fn test_extract_with_prose() {
        let content = r#"Here is the translation: [{"id": 0, "translation": "好"}] Done!"#;
        assert_eq!(
            extract_json_array(content),
            Some(r#"[{"id": 0, "translation": "好"}]"#)
        );
    }

    #[test]
    fn test_extract_fenced() {
        let content = "```json\n[{\"id\": 0}]\n```";
        assert_eq!(extract_json_array(content), Some("[{\"id\": 0}]"));
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_json_array("no array here").is_none());
    }

    #[test]
    fn test_parse_batch_valid() {
        let content = r#"[
            {"id": 11, "translation": "第二"},
            {"id": 10, "translation": "第一"}
        ]"#;
        let out = parse_batch_response(content, 10, 2).unwrap();
        // Out-of-order ids land in their slots.
        assert_eq!(out, vec!["第一".to_string(), "第二".to_string()]);
    }

    #[test]
    fn test_parse_batch_wrong_length() {
        let content = r#"[{"id": 0, "translation": "a"}]"#;
        assert!(matches!(
            parse_batch_response(content, 0, 2),
            Err(LlmError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_batch_id_outside_range() {
        let content = r#"[{"id": 5, "translation": "a"}, {"id": 6, "translation": "b"}]"#;
        assert!(parse_batch_response(content, 0, 2).is_err());
    }

    #[test]
    fn test_parse_batch_duplicate_id() {
        let content = r#"[{"id": 0, "translation": "a"}, {"id": 0, "translation": "b"}]"#;
        assert!(parse_batch_response(content, 0, 2).is_err());
    }

    #[test]
    fn test_parse_batch_empty_translation() {
        let content = r#"[{"id": 0, "translation": "  "}]"#;
        assert!(parse_batch_response(content, 0, 1).is_err());
    }

    #[test]
    fn test_parse_batch_not_json() {
        assert!(parse_batch_response("[not json]", 0, 1).is_err());
    }
}
