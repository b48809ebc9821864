use super::{api_key_from_env, parse_vector, ApiClient, RetryPolicy};
use crate::embeddings::EmbeddingProvider;
use crate::error::{ChatError, ProviderError};
use crate::generation::{build_messages, GenerationProvider};
use crate::models::GenerationRequest;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const COHERE_API_KEY: &str = "COHERE_API_KEY";
pub const COHERE_BASE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_COHERE_EMBEDDING_MODEL: &str = "embed-english-v3.0";
pub const DEFAULT_COHERE_CHAT_MODEL: &str = "command-a-03-2025";

/// The embed endpoint accepts at most this many texts per call.
const EMBED_BATCH_SIZE: usize = 96;

#[derive(Debug, Clone)]
pub struct CohereEmbeddings {
    api: ApiClient,
    model: String,
}

impl CohereEmbeddings {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(api_key.into(), COHERE_BASE_URL),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self::new(api_key_from_env(COHERE_API_KEY)?, model))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.set_base_url(base_url);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.api.set_retry(retry);
        self
    }

    async fn embed_batch(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = json!({
            "model": self.model,
            "texts": texts,
            "input_type": input_type,
            "embedding_types": ["float"],
        });

        let response = self.api.post_json("/v2/embed", &body).await?;
        let vectors = parse_embed_response(&response)?;

        if vectors.len() != texts.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        EMBED_BATCH_SIZE
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch, "search_document").await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()], "search_query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("empty embedding response".to_string()))
    }
}

fn parse_embed_response(response: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    response
        .pointer("/embeddings/float")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("cohere response has no embeddings.float".to_string())
        })?
        .iter()
        .map(parse_vector)
        .collect()
}

#[derive(Debug, Clone)]
pub struct CohereChat {
    api: ApiClient,
    model: String,
}

impl CohereChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(api_key.into(), COHERE_BASE_URL),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self::new(api_key_from_env(COHERE_API_KEY)?, model))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.set_base_url(base_url);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.api.set_retry(retry);
        self
    }
}

#[async_trait]
impl GenerationProvider for CohereChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        let body = json!({
            "model": request.settings.model,
            "messages": build_messages(request),
            "temperature": request.settings.temperature,
            "max_tokens": request.settings.max_tokens,
        });

        let response = self.api.post_json("/v2/chat", &body).await?;
        parse_chat_response(&response)
    }
}

fn parse_chat_response(response: &Value) -> Result<String, ProviderError> {
    let parts = response
        .pointer("/message/content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::MalformedResponse("cohere response has no message.content".to_string()))?;

    let text = parts
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::MalformedResponse(
            "cohere response contained no text".to_string(),
        ));
    }

    Ok(text)
}
