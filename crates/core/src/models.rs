use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 500;
pub const DEFAULT_OVERLAP_LENGTH: usize = 100;
pub const DEFAULT_SEPARATOR: &str = "\n";
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// One uploaded PDF, read once and discarded after extraction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Contiguous slice of the corpus. `start` and `end` are character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationSettings {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Everything a generation provider needs for one answer.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub context: Vec<&'a str>,
    pub history: &'a [Turn],
    pub question: &'a str,
    pub settings: &'a GenerationSettings,
}

/// Pipeline-wide knobs shared by every session built by one coordinator.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub max_chunk_length: usize,
    pub overlap_length: usize,
    pub separator: String,
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub provider_timeout: Duration,
    pub condense_question: bool,
    pub history_window: Option<usize>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            overlap_length: DEFAULT_OVERLAP_LENGTH,
            separator: DEFAULT_SEPARATOR.to_string(),
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            condense_question: false,
            history_window: None,
        }
    }
}

impl ChatOptions {
    pub fn validate(&self) -> Result<(), ChatError> {
        crate::chunking::ChunkingConfig::try_from(self)?;

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::InvalidConfig(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::InvalidConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.provider_timeout.is_zero() {
            return Err(ChatError::InvalidConfig(
                "provider timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generation_settings(&self, model: impl Into<String>) -> GenerationSettings {
        GenerationSettings {
            model: model.into(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}
