pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use chunking::{split_text, ChunkingConfig};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, EmbeddingProvider, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ChatError, ProviderError};
pub use extractor::{extract_corpus, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{build_messages, ChatMessage, GenerationProvider, Role};
pub use index::EmbeddingIndex;
pub use ingest::{discover_pdf_files, load_documents};
pub use models::{
    ChatOptions, Chunk, GenerationRequest, GenerationSettings, RetrievedChunk, SourceDocument, Turn,
};
pub use orchestrator::ChatCoordinator;
pub use providers::{
    api_key_from_env, CohereChat, CohereEmbeddings, OpenAiChat, OpenAiEmbeddings, RetryPolicy,
};
pub use registry::{RegistryLimits, SessionId, SessionRegistry, DEFAULT_SESSION_ID};
pub use session::{Conversation, SessionState};
