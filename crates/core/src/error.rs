use std::time::Duration;
use thiserror::Error;

/// Why a call to an external embedding or generation provider failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Rate limits, server errors, transport failures and timeouts may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::MalformedResponse(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to parse document {document}: {details}")]
    DocumentParse { document: String, details: String },

    #[error("no extractable text in the uploaded documents")]
    EmptyCorpus,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(#[source] ProviderError),

    #[error("generation provider error: {0}")]
    GenerationProvider(#[source] ProviderError),

    #[error("no documents have been processed for this session yet")]
    NoSession,

    #[error("missing credential: environment variable {variable} is not set")]
    MissingCredential { variable: String },

    #[error("question is empty")]
    EmptyQuestion,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ChatError {
    /// Stable machine-readable tag, used in structured error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::DocumentParse { .. } => "document_parse",
            ChatError::EmptyCorpus => "empty_corpus",
            ChatError::InvalidConfig(_) => "invalid_config",
            ChatError::EmbeddingProvider(_) => "embedding_provider",
            ChatError::GenerationProvider(_) => "generation_provider",
            ChatError::NoSession => "no_session",
            ChatError::MissingCredential { .. } => "missing_credential",
            ChatError::EmptyQuestion => "empty_question",
            ChatError::Io(_) => "io",
            ChatError::Task(_) => "task",
        }
    }

    /// Failures caused by what the caller sent, as opposed to a provider or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChatError::DocumentParse { .. }
                | ChatError::EmptyCorpus
                | ChatError::InvalidConfig(_)
                | ChatError::NoSession
                | ChatError::EmptyQuestion
        )
    }

    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            ChatError::EmbeddingProvider(_) | ChatError::GenerationProvider(_)
        )
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
