//! Assistant pane: a client-held conversation with a text-generation endpoint.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AppCore;
use crate::state::{now_millis, AssistantRole, AssistantTurn};
use crate::updates::{CoreMsg, InternalEvent};

pub(crate) const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't process that.";

/// Produces one reply per prompt. History is never sent.
#[async_trait]
pub trait AssistantBackend: Send + Sync + 'static {
    async fn generate(&self, prompt: &str, rich: bool) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    format: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
    result: Option<String>,
    text: Option<String>,
    error: Option<String>,
}

/// JSON-over-HTTP backend: `POST {prompt, format}` answered by `{result}` or `{error}`.
pub struct HttpAssistant {
    url: String,
    client: reqwest::Client,
}

impl HttpAssistant {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build assistant http client")?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl AssistantBackend for HttpAssistant {
    async fn generate(&self, prompt: &str, rich: bool) -> anyhow::Result<String> {
        let body = GenerateRequest {
            prompt,
            format: if rich { "rich" } else { "plain" },
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("assistant request failed")?;
        let status = resp.status();
        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("read assistant response body")?;
        if let Some(err) = parsed.error.filter(|e| !e.trim().is_empty()) {
            return Err(anyhow!("assistant error: {err}"));
        }
        if !status.is_success() {
            return Err(anyhow!("assistant server error ({status})"));
        }
        Ok(parsed.result.or(parsed.text).unwrap_or_default())
    }
}

fn turn(role: AssistantRole, text: String, rich: bool) -> AssistantTurn {
    AssistantTurn {
        id: uuid::Uuid::new_v4().to_string(),
        role,
        text,
        rich,
        created_at: now_millis(),
    }
}

impl AppCore {
    pub(super) fn ask_assistant(&mut self, prompt: &str, rich: bool) {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() || self.state.assistant.loading {
            return;
        }
        let Some(backend) = self.assistant.clone() else {
            self.toast("Assistant is not configured");
            return;
        };

        self.state
            .assistant
            .turns
            .push(turn(AssistantRole::User, prompt.clone(), rich));
        self.state.assistant.loading = true;
        self.emit_state();

        self.assistant_token = self.assistant_token.wrapping_add(1);
        let token = self.assistant_token;
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend
                .generate(&prompt, rich)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::AssistantReplied { token, result },
            )));
        });
    }

    pub(super) fn handle_assistant_reply(&mut self, token: u64, result: Result<String, String>) {
        if token != self.assistant_token {
            tracing::debug!(token, "dropping stale assistant reply");
            return;
        }
        self.state.assistant.loading = false;
        let rich = self
            .state
            .assistant
            .turns
            .last()
            .map(|t| t.rich)
            .unwrap_or(false);
        match result {
            Ok(text) => {
                let text = if text.trim().is_empty() {
                    EMPTY_REPLY_FALLBACK.to_string()
                } else {
                    text
                };
                self.state
                    .assistant
                    .turns
                    .push(turn(AssistantRole::Assistant, text, rich));
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%e, "assistant request failed");
                self.toast("Failed to get AI response");
            }
        }
    }

    pub(super) fn clear_assistant(&mut self) {
        // Any reply still in flight belongs to the cleared conversation.
        self.assistant_token = self.assistant_token.wrapping_add(1);
        if self.state.assistant.turns.is_empty() && !self.state.assistant.loading {
            return;
        }
        self.state.assistant.turns.clear();
        self.state.assistant.loading = false;
        self.emit_state();
    }
}
