use clap::{Args, ValueEnum};
use pdf_chat_core::embeddings::EmbeddingProvider;
use pdf_chat_core::generation::GenerationProvider;
use pdf_chat_core::models::{
    ChatOptions, DEFAULT_MAX_CHUNK_LENGTH, DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_LENGTH,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use pdf_chat_core::providers::cohere::{DEFAULT_COHERE_CHAT_MODEL, DEFAULT_COHERE_EMBEDDING_MODEL};
use pdf_chat_core::providers::openai::{DEFAULT_OPENAI_CHAT_MODEL, DEFAULT_OPENAI_EMBEDDING_MODEL};
use pdf_chat_core::{
    CharacterNgramEmbedder, ChatCoordinator, ChatError, CohereChat, CohereEmbeddings, OpenAiChat,
    OpenAiEmbeddings, RetryPolicy,
};
use std::time::Duration;
use tracing::info;

pub type DynCoordinator = ChatCoordinator<Box<dyn EmbeddingProvider>, Box<dyn GenerationProvider>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Cohere,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingKind {
    Cohere,
    Openai,
    /// Offline character-trigram embeddings; no credential needed.
    Local,
}

impl From<ProviderKind> for EmbeddingKind {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Cohere => EmbeddingKind::Cohere,
            ProviderKind::Openai => EmbeddingKind::Openai,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ProviderArgs {
    /// Hosted provider for generation (and embeddings unless overridden).
    #[arg(long, env = "PDF_CHAT_PROVIDER", value_enum, default_value_t = ProviderKind::Cohere)]
    pub provider: ProviderKind,

    /// Embedding provider override.
    #[arg(long, env = "PDF_CHAT_EMBEDDING_PROVIDER", value_enum)]
    pub embedding_provider: Option<EmbeddingKind>,

    /// Chat model; defaults to the provider's default.
    #[arg(long, env = "PDF_CHAT_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Embedding model; defaults to the provider's default.
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Retries for rate-limited or unavailable providers.
    #[arg(long, env = "PDF_CHAT_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    #[arg(long, env = "PDF_CHAT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    #[arg(long, env = "PDF_CHAT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Maximum chunk length in characters.
    #[arg(long, env = "PDF_CHAT_CHUNK_SIZE", default_value_t = DEFAULT_MAX_CHUNK_LENGTH)]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[arg(long, env = "PDF_CHAT_CHUNK_OVERLAP", default_value_t = DEFAULT_OVERLAP_LENGTH)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "PDF_CHAT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Per-call provider timeout.
    #[arg(long, env = "PDF_CHAT_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[arg(long, env = "PDF_CHAT_CONDENSE_QUESTION", default_value_t = false)]
    pub condense_question: bool,

    /// Most recent turns sent with each question; all turns when unset.
    #[arg(long, env = "PDF_CHAT_HISTORY_WINDOW")]
    pub history_window: Option<usize>,
}

impl ChatArgs {
    pub fn options(&self) -> ChatOptions {
        ChatOptions {
            max_chunk_length: self.chunk_size,
            overlap_length: self.chunk_overlap,
            top_k: self.top_k,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            provider_timeout: Duration::from_secs(self.timeout_secs),
            condense_question: self.condense_question,
            history_window: self.history_window,
            ..ChatOptions::default()
        }
    }
}

/// Builds the configured providers, reading credentials now rather than on first use.
pub fn build_coordinator(providers: &ProviderArgs, chat: &ChatArgs) -> Result<DynCoordinator, ChatError> {
    let retry = RetryPolicy::new(providers.max_retries);
    let embedding_kind = providers
        .embedding_provider
        .unwrap_or_else(|| providers.provider.into());

    let embedder: Box<dyn EmbeddingProvider> = match embedding_kind {
        EmbeddingKind::Cohere => Box::new(
            CohereEmbeddings::from_env(
                providers
                    .embedding_model
                    .as_deref()
                    .unwrap_or(DEFAULT_COHERE_EMBEDDING_MODEL),
            )?
            .with_retry(retry),
        ),
        EmbeddingKind::Openai => Box::new(
            OpenAiEmbeddings::from_env(
                providers
                    .embedding_model
                    .as_deref()
                    .unwrap_or(DEFAULT_OPENAI_EMBEDDING_MODEL),
            )?
            .with_retry(retry),
        ),
        EmbeddingKind::Local => Box::new(CharacterNgramEmbedder::default()),
    };

    let generator: Box<dyn GenerationProvider> = match providers.provider {
        ProviderKind::Cohere => Box::new(
            CohereChat::from_env(
                providers
                    .llm_model
                    .as_deref()
                    .unwrap_or(DEFAULT_COHERE_CHAT_MODEL),
            )?
            .with_retry(retry),
        ),
        ProviderKind::Openai => Box::new(
            OpenAiChat::from_env(
                providers
                    .llm_model
                    .as_deref()
                    .unwrap_or(DEFAULT_OPENAI_CHAT_MODEL),
            )?
            .with_retry(retry),
        ),
    };

    info!(
        embedding_model = embedder.model_name(),
        llm_model = generator.model_name(),
        "configured providers"
    );

    ChatCoordinator::new(embedder, generator, chat.options())
}
