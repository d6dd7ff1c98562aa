//! Chat-completion client.
//!
//! Works against any OpenAI-style endpoint via a configurable base URL,
//! model name and bearer key. Retry policy: 429 waits for Retry-After or
//! backs off exponentially, 5xx backs off, a timeout is retried once
//! immediately; everything else fails fast.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::config::LlmConfig;

/// Errors from the chat-completion endpoint, qualified so job rows can
/// distinguish timeout from non-2xx from malformed responses.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM returned status {0}")]
    Status(u16),

    #[error("LLM returned an empty completion")]
    Empty,

    #[error("Malformed LLM response: {0}")]
    Malformed(String),

    #[error("LLM network error: {0}")]
    Network(String),
}

impl LlmError {
    /// Machine-readable code recorded on job rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "llm_timeout",
            Self::Status(_) => "llm_status",
            Self::Empty => "llm_empty",
            Self::Malformed(_) => "llm_malformed",
            Self::Network(_) => "llm_network",
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Pooled chat-completion client.
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Send one system + user exchange and return the completion text.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "max_tokens": max_tokens,
            "temperature": 0.3
        });

        let response = self.send_with_retry(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::Empty);
        }

        Ok(content)
    }

    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut attempt: u32 = 0;
        let mut timeout_retried = false;

        loop {
            let result = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt >= self.max_retries {
                        return Err(LlmError::Status(429));
                    }
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "LLM rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    let status = resp.status().as_u16();
                    if attempt >= self.max_retries {
                        return Err(LlmError::Status(status));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(attempt, status, wait_ms = wait.as_millis() as u64, "LLM server error, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) => return Err(LlmError::Status(resp.status().as_u16())),
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(LlmError::Timeout);
                    }
                    warn!("LLM request timed out, retrying once");
                    timeout_retried = true;
                }
                Err(e) => return Err(LlmError::Network(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LlmError::Timeout.code(), "llm_timeout");
        assert_eq!(LlmError::Status(500).code(), "llm_status");
        assert_eq!(LlmError::Malformed("x".into()).code(), "llm_malformed");
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"translated"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("translated")
        );
    }
}
