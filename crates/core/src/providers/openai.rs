use super::{api_key_from_env, parse_vector, ApiClient, RetryPolicy};
use crate::embeddings::EmbeddingProvider;
use crate::error::{ChatError, ProviderError};
use crate::generation::{build_messages, GenerationProvider};
use crate::models::GenerationRequest;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

const EMBED_BATCH_SIZE: usize = 512;

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    api: ApiClient,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(api_key.into(), OPENAI_BASE_URL),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self::new(api_key_from_env(OPENAI_API_KEY)?, model))
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
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        EMBED_BATCH_SIZE
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let body = json!({
                "model": self.model,
                "input": batch,
            });
            let response = self.api.post_json("/v1/embeddings", &body).await?;
            let parsed = parse_embeddings_response(&response)?;

            if parsed.len() != batch.len() {
                return Err(ProviderError::MalformedResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    parsed.len()
                )));
            }
            vectors.extend(parsed);
        }

        Ok(vectors)
    }
}

/// `data[]` entries carry an `index`; order by it rather than trusting array order.
fn parse_embeddings_response(response: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::MalformedResponse("openai response has no data array".to_string()))?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .map(|index| index as usize)
                .unwrap_or(position);
            let embedding = item.get("embedding").ok_or_else(|| {
                ProviderError::MalformedResponse("openai data entry has no embedding".to_string())
            })?;
            Ok((index, parse_vector(embedding)?))
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[derive(Debug, Clone)]
pub struct OpenAiChat {
    api: ApiClient,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(api_key.into(), OPENAI_BASE_URL),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self::new(api_key_from_env(OPENAI_API_KEY)?, model))
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
impl GenerationProvider for OpenAiChat {
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

        let response = self.api.post_json("/v1/chat/completions", &body).await?;
        parse_completion_response(&response)
    }
}

fn parse_completion_response(response: &Value) -> Result<String, ProviderError> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("openai response has no choices[0].message.content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::{parse_completion_response, parse_embeddings_response};
    use serde_json::json;

    #[test]
    fn embeddings_are_ordered_by_index() {
        let response = json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.9, 0.8] },
                { "object": "embedding", "index": 0, "embedding": [0.1, 0.2] }
            ],
            "model": "text-embedding-3-small"
        });

        let vectors = parse_embeddings_response(&response).expect("response should parse");

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.9, 0.8]]);
    }

    #[test]
    fn completion_content_is_returned() {
        let response = json!({
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "API key works!" } }
            ]
        });

        assert_eq!(parse_completion_response(&response).unwrap(), "API key works!");
    }

    #[test]
    fn completion_without_choices_is_malformed() {
        assert!(parse_completion_response(&json!({ "choices": [] })).is_err());
    }
}
