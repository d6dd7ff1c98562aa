//! Whole-transcript guidance: summary and glossary.
//!
//! Both passes share the same map-reduce shape: long transcripts are split
//! into character-bounded chunks on cue boundaries, each chunk gets its own
//! call, and the partial results are consolidated. Guidance failures are
//! never fatal; translation proceeds without the missing piece.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::client::{LlmClient, LlmError};
use super::parse::extract_json_array;
use crate::config::GuidanceConfig;

/// One glossary item mapping a source-language term to its canonical
/// target-language translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Optional per-job context injected into every translation prompt.
#[derive(Debug, Clone, Default)]
pub struct Guidance {
    pub summary: Option<String>,
    pub glossary: Option<Vec<GlossaryEntry>>,
}

impl Guidance {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.glossary.is_none()
    }
}

/// Generate summary and glossary per configuration.
pub async fn generate(
    client: &LlmClient,
    config: &GuidanceConfig,
    target_lang: &str,
    lines: &[String],
) -> Guidance {
    let mut guidance = Guidance::default();

    if config.summary_enabled {
        match generate_summary(client, config, lines).await {
            Ok(summary) => guidance.summary = Some(summary),
            Err(e) => warn!(error = %e, "Summary generation failed, continuing without it"),
        }
    }

    if config.glossary_enabled {
        match generate_glossary(client, config, target_lang, lines).await {
            Ok(entries) if !entries.is_empty() => guidance.glossary = Some(entries),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Glossary generation failed, continuing without it"),
        }
    }

    guidance
}

/// Summarise the transcript in its own language.
///
/// The summary is deliberately not translated: it exists to keep register
/// and proper names stable across batches.
async fn generate_summary(
    client: &LlmClient,
    config: &GuidanceConfig,
    lines: &[String],
) -> Result<String, LlmError> {
    const SYSTEM: &str = "You summarize video transcripts. Reply with a short summary in the \
         SAME language as the transcript. Do not translate. Plain text only.";

    let chunks = chunk_lines(lines, config.summary_chunk_chars);
    if chunks.len() == 1 {
        return client.chat(SYSTEM, &chunks[0], config.summary_max_tokens).await;
    }

    let mut partials = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        partials.push(client.chat(SYSTEM, chunk, config.summary_max_tokens).await?);
    }

    let combined = format!(
        "Combine these partial summaries of one video into a single coherent summary, \
         keeping the original language:\n\n{}",
        partials.join("\n---\n")
    );
    client.chat(SYSTEM, &combined, config.summary_max_tokens).await
}

/// Extract a glossary of recurring terms as `{source, target, note?}` items.
async fn generate_glossary(
    client: &LlmClient,
    config: &GuidanceConfig,
    target_lang: &str,
    lines: &[String],
) -> Result<Vec<GlossaryEntry>, LlmError> {
    let system = format!(
        "You extract terminology from video transcripts for translation into {target_lang}. \
         Reply with ONLY a JSON array of objects: \
         [{{\"source\": \"term\", \"target\": \"translation\", \"note\": \"optional\"}}]. \
         Include names, jargon and recurring phrases that must be translated consistently. \
         Reply [] if there are none."
    );

    let chunks = chunk_lines(lines, config.glossary_chunk_chars);
    let mut merged: Vec<GlossaryEntry> = Vec::new();

    for chunk in &chunks {
        let content = client.chat(&system, chunk, config.glossary_max_tokens).await?;
        let entries = parse_glossary(&content)?;
        for entry in entries {
            // First occurrence wins so early chunks pin the terminology.
            if !merged
                .iter()
                .any(|e| e.source.eq_ignore_ascii_case(&entry.source))
            {
                merged.push(entry);
            }
        }
    }

    Ok(merged)
}

/// Parse a glossary reply, tolerating code fences and surrounding prose.
fn parse_glossary(content: &str) -> Result<Vec<GlossaryEntry>, LlmError> {
    let array = extract_json_array(content)
        .ok_or_else(|| LlmError::Malformed("no JSON array in glossary reply".into()))?;
    let entries: Vec<GlossaryEntry> =
        serde_json::from_str(array).map_err(|e| LlmError::Malformed(e.to_string()))?;
    Ok(entries
        .into_iter()
        .filter(|e| !e.source.trim().is_empty() && !e.target.trim().is_empty())
        .collect())
}

/// Split lines into chunks of at most `max_chars` characters, never breaking
/// inside a line.
fn chunk_lines(lines: &[String], max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        if !current.is_empty() && current.len() + line.len() + 1 > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }

    chunks
}
