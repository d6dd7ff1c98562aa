//! Translation of cue lists into bilingual tracks.
//!
//! The context path batches lines with summary/glossary guidance and
//! sliding context windows; the simple path translates one line per call.
//! Partial failures degrade per line (the original text stands in); only a
//! translation round that produced nothing at all is surfaced as an error
//! so the job-level retry machinery can take over.

pub mod client;
pub mod context;
pub mod guidance;
pub mod parse;

pub use client::{LlmClient, LlmError};
pub use guidance::{GlossaryEntry, Guidance};

use std::sync::Arc;
use std::time::Duration;

use timedtext::Cue;
use tracing::{info, warn};

use crate::config::{ContextConfig, GuidanceConfig};

/// Delay between waves on the simple path.
const SIMPLE_WAVE_DELAY: Duration = Duration::from_millis(200);

/// Cue-list translator against a chat-completion LLM.
pub struct Translator {
    client: Arc<LlmClient>,
    target_lang: String,
    guidance: GuidanceConfig,
    context: ContextConfig,
}

impl Translator {
    pub fn new(
        client: Arc<LlmClient>,
        target_lang: impl Into<String>,
        guidance: GuidanceConfig,
        context: ContextConfig,
    ) -> Self {
        Self {
            client,
            target_lang: target_lang.into(),
            guidance,
            context,
        }
    }

    /// Translate a cue list into a bilingual one.
    ///
    /// Output cues keep the input timing; the text becomes
    /// `original + "\n" + translation`. Lines that could not be translated
    /// keep the original alone. Errors only when not a single line was
    /// translated.
    pub async fn translate(&self, cues: &[Cue]) -> Result<Vec<Cue>, LlmError> {
        if cues.is_empty() {
            return Ok(Vec::new());
        }

        let lines: Arc<Vec<String>> = Arc::new(cues.iter().map(|c| c.text.clone()).collect());

        let guidance = guidance::generate(
            &self.client,
            &self.guidance,
            &self.target_lang,
            &lines,
        )
        .await;
        if !guidance.is_empty() {
            info!(
                summary = guidance.summary.is_some(),
                glossary_terms = guidance.glossary.as_ref().map(|g| g.len()).unwrap_or(0),
                "Guidance generated"
            );
        }

        let translations = if self.context.enabled {
            context::translate_batched(
                self.client.clone(),
                &self.context,
                &self.target_lang,
                &guidance,
                lines.clone(),
            )
            .await
        } else {
            self.translate_simple(&guidance, &lines).await
        };

        let translated_count = translations.iter().filter(|t| t.is_some()).count();
        if translated_count == 0 {
            // Nothing came back at all: treat as an LLM outage so the job
            // retries instead of caching an untranslated track.
            return Err(LlmError::Empty);
        }
        if translated_count < cues.len() {
            warn!(
                translated = translated_count,
                total = cues.len(),
                "Some lines kept their original text"
            );
        }

        Ok(cues
            .iter()
            .zip(translations)
            .map(|(cue, translation)| {
                let text = match translation {
                    Some(t) if t != cue.text => format!("{}\n{}", cue.text, t),
                    _ => cue.text.clone(),
                };
                Cue::new(cue.start_ms, cue.end_ms, text)
            })
            .collect())
    }

    /// Simple path: one cue per call, concurrent waves with a short pause
    /// between them.
    async fn translate_simple(
        &self,
        guidance: &Guidance,
        lines: &Arc<Vec<String>>,
    ) -> Vec<Option<String>> {
        let wave_size = self.context.concurrency.max(1);
        let mut out: Vec<Option<String>> = vec![None; lines.len()];

        for (wave_index, wave) in lines.chunks(wave_size).enumerate() {
            if wave_index > 0 {
                tokio::time::sleep(SIMPLE_WAVE_DELAY).await;
            }

            let mut tasks: tokio::task::JoinSet<(usize, Option<String>)> =
                tokio::task::JoinSet::new();
            for (offset, line) in wave.iter().enumerate() {
                let index = wave_index * wave_size + offset;
                let client = self.client.clone();
                let config = self.context.clone();
                let target_lang = self.target_lang.clone();
                let guidance = guidance.clone();
                let line = line.clone();
                tasks.spawn(async move {
                    let translation = context::translate_single_line(
                        &client,
                        &config,
                        &target_lang,
                        &guidance,
                        &line,
                    )
                    .await;
                    (index, translation)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Ok((index, translation)) = joined {
                    out[index] = translation;
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilingual_text_shape() {
        // The output contract other components rely on: original, newline,
        // translation.
        let cue = Cue::new(0, 1000, "hello");
        let bilingual = format!("{}\n{}", cue.text, "你好");
        let (original, translation) = bilingual.split_once('\n').unwrap();
        assert_eq!(original, "hello");
        assert_eq!(translation, "你好");
    }
}
