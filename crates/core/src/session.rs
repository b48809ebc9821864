use crate::embeddings::EmbeddingProvider;
use crate::error::ChatError;
use crate::generation::GenerationProvider;
use crate::index::EmbeddingIndex;
use crate::models::{SourceDocument, Turn};
use crate::orchestrator::ChatCoordinator;
use tracing::info;

/// A built index together with the questions asked against it.
#[derive(Debug, Clone)]
pub struct SessionState {
    index: EmbeddingIndex,
    history: Vec<Turn>,
}

impl SessionState {
    pub fn new(index: EmbeddingIndex) -> Self {
        Self {
            index,
            history: Vec::new(),
        }
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

/// One conversation over one upload batch.
///
/// Starts empty; `ingest` moves it to ready and every later `ingest` replaces the index and
/// clears the history. Failed operations never change what a previous success produced.
#[derive(Debug, Default)]
pub struct Conversation {
    state: Option<SessionState>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn history(&self) -> &[Turn] {
        self.state
            .as_ref()
            .map(SessionState::history)
            .unwrap_or_default()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.as_ref().map(|state| state.index.len()).unwrap_or(0)
    }

    /// Builds a new session from `documents`, returning its chunk count.
    pub async fn ingest<E, G>(
        &mut self,
        coordinator: &ChatCoordinator<E, G>,
        documents: Vec<SourceDocument>,
    ) -> Result<usize, ChatError>
    where
        E: EmbeddingProvider,
        G: GenerationProvider,
    {
        let state = coordinator.build_session(documents).await?;
        let chunks = state.index.len();

        if self.state.replace(state).is_some() {
            info!(chunks, "replaced previous session, history cleared");
        }

        Ok(chunks)
    }

    /// Answers `question` and records the exchange. History is only appended on success.
    pub async fn ask<E, G>(
        &mut self,
        coordinator: &ChatCoordinator<E, G>,
        question: &str,
    ) -> Result<String, ChatError>
    where
        E: EmbeddingProvider,
        G: GenerationProvider,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let state = self.state.as_mut().ok_or(ChatError::NoSession)?;
        let answer = coordinator
            .answer(&state.index, &state.history, question)
            .await?;

        state.history.push(Turn {
            question: question.to_string(),
            answer: answer.clone(),
        });

        Ok(answer)
    }
}
