use crate::ai::retry::{RetryPolicy, with_retries};
use crate::ai::{ChatClient, Message, TaskType};
use crate::config::{ModelTable, OpenRouterSettings};
use crate::errors::GeneratorError;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "OpenRouter";
const REFERER: &str = "https://github.com/theme-builder/theme-builder";
const APP_TITLE: &str = "Theme Builder";

/// Chat-completion client for the OpenRouter API.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    models: ModelTable,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenRouterClient {
    pub fn new(settings: &OpenRouterSettings, models: ModelTable) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            models,
            retry: RetryPolicy::new(4, Duration::from_secs(1)),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, GeneratorError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(body)
            .send()
            .await
            .map_err(|source| GeneratorError::Http {
                service: SERVICE,
                source,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| GeneratorError::Http {
            service: SERVICE,
            source,
        })?;

        if !status.is_success() {
            return Err(GeneratorError::Api {
                service: SERVICE,
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GeneratorError::Parse(format!("{SERVICE} response: {e}")))?;
        first_choice_content(parsed)
    }
}

fn first_choice_content(resp: ChatResponse) -> Result<String, GeneratorError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GeneratorError::Parse(format!("{SERVICE} returned no content")))
}

/// Best-effort human message from an error body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| crate::util::truncate(body.trim(), 300))
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn chat(&self, messages: &[Message], task: TaskType) -> Result<String, GeneratorError> {
        let model = self.models.for_task(task);
        let body = ChatRequest {
            model: &model.id,
            messages,
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        };
        tracing::debug!(model = %model.id, ?task, messages = messages.len(), "Chat request");
        with_retries(self.retry, SERVICE, |_| self.send_once(&body)).await
    }
}
