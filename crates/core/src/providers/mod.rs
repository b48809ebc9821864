//! HTTP clients for hosted embedding and generation APIs.
//!
//! Credentials are read once, when a client is constructed, so a missing key
//! surfaces at startup instead of in the middle of a request.

pub mod cohere;
pub mod openai;

pub use cohere::{CohereChat, CohereEmbeddings};
pub use openai::{OpenAiChat, OpenAiEmbeddings};

use crate::error::{ChatError, ProviderError};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Opt-in retry for transient provider failures. The default performs no retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// 1s, 2s, 4s, ... capped at 32s.
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Self::backoff(attempt);
                    warn!(attempt, max_retries = self.max_retries, ?delay, %error, "provider call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Reads a non-blank API key from the environment.
pub fn api_key_from_env(variable: &str) -> Result<String, ChatError> {
    std::env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ChatError::MissingCredential {
            variable: variable.to_string(),
        })
}

/// Authenticated JSON-over-HTTP access shared by every hosted provider client.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub(crate) fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub(crate) fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
    }

    pub(crate) fn set_retry(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        self.retry.run(move || self.post_once(url, body)).await
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| ProviderError::MalformedResponse(error.to_string()))
    }
}

/// Reads a JSON array of numbers as an embedding vector.
pub(crate) fn parse_vector(value: &Value) -> Result<Vec<f32>, ProviderError> {
    value
        .as_array()
        .ok_or_else(|| ProviderError::MalformedResponse("embedding is not an array".to_string()))?
        .iter()
        .map(|item| {
            item.as_f64().map(|number| number as f32).ok_or_else(|| {
                ProviderError::MalformedResponse("embedding contains a non-number".to_string())
            })
        })
        .collect()
}
