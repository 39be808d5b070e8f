//! Text generation client for answer synthesis.
//!
//! The engine talks to a [`Generator`]; the production implementation is
//! [`ChatClient`], which calls an OpenAI-compatible `/chat/completions`
//! endpoint (DeepSeek by default).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;

/// Trait for chat-completion backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces a completion for a system instruction plus user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            bail!("generation API key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Creates a client reading the key from `DEEPSEEK_API_KEY`.
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .map_err(|_| anyhow!("DEEPSEEK_API_KEY environment variable not set"))?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("generation API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("invalid chat completion response body")?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("chat completion response missing message content"))?;
        Ok(content.trim().to_string())
    }
}
