//! Context-aware batched translation.
//!
//! Cues are translated in contiguous batches. Each prompt carries the
//! transcript summary and glossary, a window of preceding lines, the batch
//! itself tagged with absolute indices, and a preview of the following
//! lines — enough context to keep terminology and tone stable across batch
//! boundaries. Batches run concurrently and may complete in any order;
//! results are written into per-index slots so ordering is never a concern.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::client::{LlmClient, LlmError};
use super::guidance::Guidance;
use super::parse::parse_batch_response;
use crate::config::ContextConfig;

/// Translate `lines` in batches; slot `i` of the result holds the
/// translation for line `i`, or `None` where even the per-line fallback
/// failed.
pub async fn translate_batched(
    client: Arc<LlmClient>,
    config: &ContextConfig,
    target_lang: &str,
    guidance: &Guidance,
    lines: Arc<Vec<String>>,
) -> Vec<Option<String>> {
    let batch_size = config.batch_size.max(1);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks: JoinSet<(usize, Vec<Option<String>>)> = JoinSet::new();

    let mut start = 0;
    while start < lines.len() {
        let len = batch_size.min(lines.len() - start);
        let client = client.clone();
        let config = config.clone();
        let target_lang = target_lang.to_string();
        let guidance = guidance.clone();
        let lines = lines.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (start, vec![None; len]),
            };
            let translations =
                translate_batch(&client, &config, &target_lang, &guidance, &lines, start, len)
                    .await;
            (start, translations)
        });

        start += len;
    }

    let mut slots: Vec<Option<String>> = vec![None; lines.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((start, translations)) => {
                for (offset, translation) in translations.into_iter().enumerate() {
                    slots[start + offset] = translation;
                }
            }
            Err(e) => warn!(error = %e, "Batch task panicked"),
        }
    }

    slots
}

/// Translate one batch: full-batch attempts with retries, then per-line
/// fallback. The fallback never aborts; a line that cannot be translated
/// stays `None`.
async fn translate_batch(
    client: &LlmClient,
    config: &ContextConfig,
    target_lang: &str,
    guidance: &Guidance,
    lines: &[String],
    start: usize,
    len: usize,
) -> Vec<Option<String>> {
    let prompt = build_batch_prompt(config, target_lang, guidance, lines, start, len);
    let system = system_prompt(target_lang);

    let mut last_error: Option<LlmError> = None;
    for attempt in 0..=config.batch_retries {
        match client.chat(&system, &prompt, config.max_tokens).await {
            Ok(content) => match parse_batch_response(&content, start, len) {
                Ok(translations) => {
                    return translations.into_iter().map(Some).collect();
                }
                Err(e) => {
                    debug!(start, attempt, error = %e, "Batch reply failed validation");
                    last_error = Some(e);
                }
            },
            Err(e) => {
                debug!(start, attempt, error = %e, "Batch call failed");
                last_error = Some(e);
            }
        }
    }

    warn!(
        start,
        len,
        error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
        "Batch exhausted retries, falling back to per-line translation"
    );

    let mut out = Vec::with_capacity(len);
    for line in &lines[start..start + len] {
        out.push(translate_single_line(client, config, target_lang, guidance, line).await);
    }
    out
}

/// Translate a single line; errors degrade to `None` (caller keeps the
/// original text).
pub async fn translate_single_line(
    client: &LlmClient,
    config: &ContextConfig,
    target_lang: &str,
    guidance: &Guidance,
    line: &str,
) -> Option<String> {
    let mut prompt = String::new();
    push_guidance(&mut prompt, guidance);
    let _ = writeln!(
        prompt,
        "Translate this subtitle line to {target_lang}. Reply with ONLY the translation:"
    );
    prompt.push_str(line);

    match client
        .chat(&system_prompt(target_lang), &prompt, config.max_tokens)
        .await
    {
        Ok(translation) => {
            let translation = translation.trim();
            if translation.is_empty() {
                None
            } else {
                Some(translation.to_string())
            }
        }
        Err(e) => {
            debug!(error = %e, "Single-line fallback failed, keeping original");
            None
        }
    }
}

fn system_prompt(target_lang: &str) -> String {
    format!(
        "You are a subtitle translator producing natural, concise {target_lang} lines. \
         Preserve names and the register of the original."
    )
}

/// Assemble the batch prompt: guidance, preceding context, the indexed
/// batch, following preview, and the output-contract instruction.
fn build_batch_prompt(
    config: &ContextConfig,
    target_lang: &str,
    guidance: &Guidance,
    lines: &[String],
    start: usize,
    len: usize,
) -> String {
    let mut prompt = String::new();
    push_guidance(&mut prompt, guidance);

    let preceding_from = start.saturating_sub(config.preceding_lines);
    if preceding_from < start {
        prompt.push_str("Preceding lines (context only, do not translate):\n");
        for (i, line) in lines[preceding_from..start].iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {}", preceding_from + i, line);
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "Translate these lines to {target_lang}:");
    for (i, line) in lines[start..start + len].iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}", start + i, line);
    }

    let following_to = (start + len + config.following_lines).min(lines.len());
    if start + len < following_to {
        prompt.push_str("\nFollowing lines (context only, do not translate):\n");
        for (i, line) in lines[start + len..following_to].iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {}", start + len + i, line);
        }
    }

    let _ = write!(
        prompt,
        "\nReply with ONLY a JSON array of {len} objects, one per line to translate: \
         [{{\"id\": <index>, \"translation\": \"...\"}}]. \
         The id values must be exactly {start}..{}.",
        start + len - 1
    );

    prompt
}

fn push_guidance(prompt: &mut String, guidance: &Guidance) {
    if let Some(summary) = &guidance.summary {
        let _ = writeln!(prompt, "Video summary (for context):\n{summary}\n");
    }
    if let Some(glossary) = &guidance.glossary {
        prompt.push_str("Glossary (use these translations consistently):\n");
        for entry in glossary {
            match &entry.note {
                Some(note) => {
                    let _ = writeln!(prompt, "- {} => {} ({})", entry.source, entry.target, note);
                }
                None => {
                    let _ = writeln!(prompt, "- {} => {}", entry.source, entry.target);
                }
            }
        }
        prompt.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::guidance::GlossaryEntry;

    fn test_config() -> ContextConfig {
        ContextConfig {
            enabled: true,
            batch_size: 3,
            preceding_lines: 2,
            following_lines: 1,
            concurrency: 2,
            batch_retries: 1,
            max_tokens: 512,
        }
    }

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {i}")).collect()
    }

    #[test]
    fn test_batch_prompt_contains_absolute_indices() {
        let prompt = build_batch_prompt(
            &test_config(),
            "zh-CN",
            &Guidance::default(),
            &lines(10),
            3,
            3,
        );
        assert!(prompt.contains("[3] line 3"));
        assert!(prompt.contains("[5] line 5"));
        assert!(prompt.contains("exactly 3..5"));
    }

    #[test]
    fn test_batch_prompt_context_windows() {
        let prompt = build_batch_prompt(
            &test_config(),
            "zh-CN",
            &Guidance::default(),
            &lines(10),
            3,
            3,
        );
        // Two preceding lines and one following line around batch 3..6.
        assert!(prompt.contains("[1] line 1"));
        assert!(prompt.contains("[2] line 2"));
        assert!(prompt.contains("[6] line 6"));
        assert!(!prompt.contains("[0] line 0"));
        assert!(!prompt.contains("[7] line 7"));
    }

    #[test]
    fn test_batch_prompt_first_batch_has_no_preceding() {
        let prompt = build_batch_prompt(
            &test_config(),
            "zh-CN",
            &Guidance::default(),
            &lines(10),
            0,
            3,
        );
        assert!(!prompt.contains("Preceding lines"));
        assert!(prompt.contains("[0] line 0"));
    }

    #[test]
    fn test_batch_prompt_includes_guidance() {
        let guidance = Guidance {
            summary: Some("A talk about compilers.".into()),
            glossary: Some(vec![GlossaryEntry {
                source: "borrow checker".into(),
                target: "借用检查器".into(),
                note: None,
            }]),
        };
        let prompt = build_batch_prompt(&test_config(), "zh-CN", &guidance, &lines(5), 0, 2);
        assert!(prompt.contains("A talk about compilers."));
        assert!(prompt.contains("borrow checker => 借用检查器"));
    }

    #[test]
    fn test_system_prompt_names_target_language() {
        assert!(system_prompt("zh-CN").contains("zh-CN"));
    }
}
