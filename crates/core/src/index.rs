use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{ChatError, ProviderError};
use crate::models::{Chunk, RetrievedChunk};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::debug;

/// In-memory similarity index over one ingestion batch. Never empty, never updated in place.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    model: String,
}

impl EmbeddingIndex {
    /// Embeds every chunk with no time limit. Any provider failure aborts the whole build.
    pub async fn build<E>(provider: &E, chunks: Vec<Chunk>) -> Result<Self, ChatError>
    where
        E: EmbeddingProvider + ?Sized,
    {
        Self::build_bounded(provider, chunks, None).await
    }

    /// Embeds chunks in batches of the provider's `max_batch_size`, one call per batch.
    ///
    /// `call_timeout` bounds each call on its own, so a large corpus is not held to a single
    /// deadline. Nothing is returned unless every batch succeeded.
    pub async fn build_bounded<E>(
        provider: &E,
        chunks: Vec<Chunk>,
        call_timeout: Option<Duration>,
    ) -> Result<Self, ChatError>
    where
        E: EmbeddingProvider + ?Sized,
    {
        if chunks.is_empty() {
            return Err(ChatError::EmptyCorpus);
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let batch_size = provider.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_number, batch) in texts.chunks(batch_size).enumerate() {
            let call = provider.embed(batch);
            let embedded = match call_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(limit)),
                },
                None => call.await,
            }
            .map_err(ChatError::EmbeddingProvider)?;

            if embedded.len() != batch.len() {
                return Err(ChatError::EmbeddingProvider(ProviderError::MalformedResponse(format!(
                    "embedding count {} doesn't match batch size {}",
                    embedded.len(),
                    batch.len()
                ))));
            }

            debug!(batch = batch_number, texts = batch.len(), "embedded batch");
            vectors.extend(embedded);
        }

        Ok(Self {
            entries: chunks.into_iter().zip(vectors).collect(),
            model: provider.model_name().to_string(),
        })
    }

    /// Top `k` chunks by cosine similarity, best first; equal scores keep chunk order.
    ///
    /// A `k` larger than the index returns every chunk.
    pub async fn query<E>(
        &self,
        provider: &E,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let query_vector = provider
            .embed_query(text)
            .await
            .map_err(ChatError::EmbeddingProvider)?;

        Ok(self.rank(&query_vector, k))
    }

    pub fn rank(&self, query_vector: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored = self
            .entries
            .iter()
            .map(|(chunk, vector)| (chunk, cosine_similarity(query_vector, vector)))
            .collect::<Vec<_>>();

        // `sort_by` is stable, so ties stay in chunk order.
        scored.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(chunk, score)| RetrievedChunk {
                chunk: chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }
}
