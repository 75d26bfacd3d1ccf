use crate::ai::retry::{RetryPolicy, with_retries};
use crate::config::ReplicateSettings;
use crate::errors::GeneratorError;
use crate::images::{ImageGenerator, ImageKind, ImageResult};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const SERVICE: &str = "Replicate";

/// Image generation through Replicate predictions: create, then poll until terminal.
pub struct ReplicateClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    model: String,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; models return either a string or a list.
    fn first_output(&self) -> Option<String> {
        match &self.output {
            serde_json::Value::String(url) => Some(url.clone()),
            serde_json::Value::Array(items) => items
                .iter()
                .find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

impl ReplicateClient {
    pub fn new(settings: &ReplicateSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build Replicate HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone(),
            model: settings.model.clone(),
            retry: RetryPolicy::new(3, Duration::from_secs(5)),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Versioned refs (`owner/name:version`) go to `/predictions`, bare model names
    /// to the model's own endpoint.
    fn create_request(&self, prompt: &str) -> (String, serde_json::Value) {
        let input = json!({
            "prompt": prompt,
            "width": 1024,
            "height": 1024,
            "num_outputs": 1,
        });
        match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.base_url, self.model),
                json!({ "input": input }),
            ),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, GeneratorError> {
        let resp = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|source| GeneratorError::Http {
                service: SERVICE,
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                service: SERVICE,
                status: status.as_u16(),
                message: crate::util::truncate(body.trim(), 300),
            });
        }
        resp.json::<Prediction>()
            .await
            .map_err(|e| GeneratorError::Parse(format!("{SERVICE} prediction: {e}")))
    }

    async fn poll(&self, mut prediction: Prediction) -> Result<Prediction, GeneratorError> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(GeneratorError::Timeout {
                    operation: format!("Prediction {}", prediction.id),
                    seconds: self.poll_interval.as_secs() * u64::from(self.max_polls),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            let url = format!("{}/predictions/{}", self.base_url, prediction.id);
            prediction = self.send(self.http.get(url)).await?;
            tracing::debug!(id = %prediction.id, status = %prediction.status, polls, "Polled prediction");
        }
        Ok(prediction)
    }

    async fn run_prediction(&self, prompt: &str) -> Result<String, GeneratorError> {
        let (url, body) = self.create_request(prompt);
        let created = self.send(self.http.post(url).json(&body)).await?;
        let finished = self.poll(created).await?;
        if finished.status != "succeeded" {
            let message = finished
                .error
                .as_ref()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .unwrap_or_else(|| finished.status.clone());
            return Err(GeneratorError::PredictionFailed {
                id: finished.id,
                message,
            });
        }
        finished
            .first_output()
            .ok_or_else(|| GeneratorError::Parse(format!("Prediction {} has no output", finished.id)))
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn generate(&self, prompt: &str, kind: ImageKind, variant: Option<&str>) -> ImageResult {
        let outcome = with_retries(self.retry, SERVICE, |_| self.run_prediction(prompt)).await;
        let (image_url, error) = match outcome {
            Ok(url) => (Some(url), None),
            Err(e) => {
                tracing::warn!(?kind, variant, error = %e, "Image generation failed");
                (None, Some(e.to_string()))
            }
        };
        ImageResult {
            kind,
            variant: variant.map(str::to_string),
            prompt: prompt.to_string(),
            image_url,
            error,
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), GeneratorError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| GeneratorError::Http {
                service: SERVICE,
                source,
            })?;
        let bytes = resp.bytes().await.map_err(|source| GeneratorError::Http {
            service: SERVICE,
            source,
        })?;
        let io_err = |source: std::io::Error| GeneratorError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(dest, &bytes).await.map_err(io_err)?;
        Ok(())
    }
}
