use crate::chunking::{split_text, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{ChatError, ProviderError};
use crate::extractor::{extract_corpus, LopdfExtractor, PdfExtractor};
use crate::generation::{bare_request, condense_question_prompt, GenerationProvider};
use crate::index::EmbeddingIndex;
use crate::models::{
    ChatOptions, GenerationRequest, GenerationSettings, RetrievedChunk, SourceDocument, Turn,
};
use crate::session::SessionState;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs the ingestion and answering pipeline against one pair of providers.
///
/// The coordinator is the only component that talks to providers; every provider call (each
/// embedding batch, each query, each generation) is bounded by [`ChatOptions::provider_timeout`].
/// It holds no conversation state itself.
pub struct ChatCoordinator<E, G>
where
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    embedder: E,
    generator: G,
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
    settings: GenerationSettings,
    options: ChatOptions,
}

impl<E, G> ChatCoordinator<E, G>
where
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    pub fn new(embedder: E, generator: G, options: ChatOptions) -> Result<Self, ChatError> {
        options.validate()?;
        let chunking = ChunkingConfig::try_from(&options)?;
        let settings = options.generation_settings(generator.model_name());

        Ok(Self {
            embedder,
            generator,
            extractor: Arc::new(LopdfExtractor),
            chunking,
            settings,
            options,
        })
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Extracts, chunks and indexes a batch into a fresh session with empty history.
    ///
    /// Nothing is returned unless every stage succeeded, so callers can swap the result in
    /// without ever exposing a partial index.
    pub async fn build_session(&self, documents: Vec<SourceDocument>) -> Result<SessionState, ChatError> {
        let started = Instant::now();
        let document_count = documents.len();

        if documents.is_empty() {
            return Err(ChatError::EmptyCorpus);
        }

        let extractor = Arc::clone(&self.extractor);
        let corpus = tokio::task::spawn_blocking(move || extract_corpus(extractor.as_ref(), &documents))
            .await
            .map_err(|error| ChatError::Task(error.to_string()))??;

        if corpus.trim().is_empty() {
            return Err(ChatError::EmptyCorpus);
        }

        let chunks = split_text(&corpus, &self.chunking);
        debug!(corpus_chars = corpus.chars().count(), chunk_count = chunks.len(), "split corpus");

        let index =
            EmbeddingIndex::build_bounded(&self.embedder, chunks, Some(self.options.provider_timeout))
                .await?;

        info!(
            documents = document_count,
            chunks = index.len(),
            model = %index.model(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built session index"
        );

        Ok(SessionState::new(index))
    }

    /// Answers `question` from `index` and `history` without touching either.
    pub async fn answer(
        &self,
        index: &EmbeddingIndex,
        history: &[Turn],
        question: &str,
    ) -> Result<String, ChatError> {
        let started = Instant::now();
        let history = self.history_window(history);

        let retrieval_query = if self.options.condense_question && !history.is_empty() {
            self.condense(history, question).await?
        } else {
            question.to_string()
        };

        let retrieved = self.retrieve(index, &retrieval_query).await?;

        let request = GenerationRequest {
            context: retrieved.iter().map(|hit| hit.chunk.text.as_str()).collect(),
            history,
            question,
            settings: &self.settings,
        };

        let answer = self.generate(&request).await?;

        info!(
            retrieved = retrieved.len(),
            history_turns = history.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answered question"
        );

        Ok(answer)
    }

    pub async fn retrieve(&self, index: &EmbeddingIndex, query: &str) -> Result<Vec<RetrievedChunk>, ChatError> {
        bounded(
            self.options.provider_timeout,
            index.query(&self.embedder, query, self.options.top_k),
            ChatError::EmbeddingProvider,
        )
        .await
    }

    pub async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ChatError> {
        let result = bounded(
            self.options.provider_timeout,
            async {
                self.generator
                    .generate(request)
                    .await
                    .map_err(ChatError::GenerationProvider)
            },
            ChatError::GenerationProvider,
        )
        .await;

        if let Err(error) = &result {
            warn!(%error, model = %self.settings.model, "generation failed");
        }

        result
    }

    /// Sends a minimal prompt to confirm the generation credential works.
    pub async fn check_generation(&self, prompt: &str) -> Result<String, ChatError> {
        let settings = GenerationSettings {
            max_tokens: self.settings.max_tokens.min(16),
            ..self.settings.clone()
        };
        self.generate(&bare_request(prompt, &settings)).await
    }

    async fn condense(&self, history: &[Turn], question: &str) -> Result<String, ChatError> {
        let prompt = condense_question_prompt(history, question);
        let standalone = self.generate(&bare_request(&prompt, &self.settings)).await?;
        let standalone = standalone.trim();

        debug!(original = %question, standalone = %standalone, "condensed follow-up question");

        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(standalone.to_string())
        }
    }

    fn history_window<'h>(&self, history: &'h [Turn]) -> &'h [Turn] {
        match self.options.history_window {
            Some(window) => &history[history.len().saturating_sub(window)..],
            None => history,
        }
    }
}

/// Applies the provider timeout; expiry is reported through `on_timeout` as a provider error.
async fn bounded<T, F>(
    limit: Duration,
    future: F,
    on_timeout: fn(ProviderError) -> ChatError,
) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(ProviderError::Timeout(limit))),
    }
}
