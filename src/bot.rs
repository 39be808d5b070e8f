//! Telegram chat front-end.
//!
//! Long-polls `getUpdates` and answers free-text questions from one
//! knowledge base. Each incoming message is handled in its own task so a
//! slow answer never blocks the poll loop, and a failed answer replies with
//! an apology instead of killing the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::engine::RetrievalEngine;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
/// Long-poll wait passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 50;
/// Pause before re-polling after a transport error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

const APOLOGY: &str =
    "Sorry, something went wrong while processing your question. Please try again.";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone)]
pub struct TelegramBot {
    client: reqwest::Client,
    token: String,
    api_url: String,
    engine: Arc<RetrievalEngine>,
    answer_timeout: Duration,
}

impl TelegramBot {
    pub fn new(
        token: String,
        engine: Arc<RetrievalEngine>,
        answer_timeout: Duration,
    ) -> Result<Self> {
        if token.is_empty() {
            bail!("bot token is empty");
        }
        // The HTTP timeout must outlast the long-poll wait.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            token,
            api_url: DEFAULT_API_URL.to_string(),
            engine,
            answer_timeout,
        })
    }

    /// Creates a bot reading the token from `TELEGRAM_BOT_TOKEN`.
    pub fn from_env(engine: Arc<RetrievalEngine>, answer_timeout: Duration) -> Result<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN environment variable not set"))?;
        Self::new(token, engine, answer_timeout)
    }

    /// Runs the poll loop until the process is terminated.
    pub async fn run(&self) -> Result<()> {
        info!(agent = %self.engine.agent_type(), "bot polling for updates");
        let mut offset: i64 = 0;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text else { continue };
                let chat_id = message.chat.id;
                let bot = self.clone();
                tokio::spawn(async move {
                    bot.handle_message(chat_id, text).await;
                });
            }
        }
    }

    async fn handle_message(&self, chat_id: i64, text: String) {
        if let Some(reply) = command_reply(&text, self.engine.agent_type().display_name()) {
            self.send_message(chat_id, &reply).await;
            return;
        }

        self.send_chat_action(chat_id, "typing").await;

        let reply =
            match tokio::time::timeout(self.answer_timeout, self.engine.answer(&text, None)).await
            {
                Ok(Ok(answer)) => {
                    let sources: Vec<(String, f32)> = answer
                        .sources
                        .iter()
                        .map(|s| (s.filename.clone(), s.score))
                        .collect();
                    format!("{}{}", answer.text, format_sources(&sources))
                }
                Ok(Err(e)) => {
                    error!(chat_id, error = %format!("{:#}", e), "answer failed");
                    APOLOGY.to_string()
                }
                Err(_) => {
                    error!(chat_id, "answer timed out");
                    APOLOGY.to_string()
                }
            };

        self.send_message(chat_id, &reply).await;
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "timeout": POLL_TIMEOUT_SECS,
            "offset": offset,
            "allowed_updates": ["message"],
        });
        let response: ApiResponse<Vec<Update>> = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("invalid getUpdates response")?;
        if !response.ok {
            bail!(
                "getUpdates rejected: {}",
                response.description.unwrap_or_default()
            );
        }
        Ok(response.result.unwrap_or_default())
    }

    /// Send failures are logged, not propagated; the poll loop must survive.
    async fn send_message(&self, chat_id: i64, text: &str) {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Err(e) = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            warn!(chat_id, error = %e, "sendMessage failed");
        }
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) {
        let body = serde_json::json!({ "chat_id": chat_id, "action": action });
        if let Err(e) = self
            .client
            .post(self.method_url("sendChatAction"))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            warn!(chat_id, error = %e, "sendChatAction failed");
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }
}

/// Canned replies for bot commands; `None` means treat as a question.
fn command_reply(text: &str, knowledge_base: &str) -> Option<String> {
    match text.trim() {
        "/start" => Some(format!(
            "Hello! I answer questions from the {} knowledge base. \
             Just send me your question.",
            knowledge_base
        )),
        "/help" => Some(
            "Send a question in plain text and I will answer from the stored \
             documents, citing the sources I used."
                .to_string(),
        ),
        _ => None,
    }
}

/// Formats the source list appended to an answer. Filenames are
/// deduplicated keeping the best-ranked occurrence.
fn format_sources(sources: &[(String, f32)]) -> String {
    let mut seen = Vec::new();
    for (filename, score) in sources {
        if !seen.iter().any(|(f, _)| f == filename) {
            seen.push((filename.clone(), *score));
        }
    }
    if seen.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nSources:");
    for (i, (filename, score)) in seen.iter().enumerate() {
        out.push_str(&format!("\n{}. {} (relevance: {:.2})", i + 1, filename, score));
    }
    out
}
