pub mod chunking;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{split_text, ChunkingConfig};
pub use config::{
    EmbeddingProvider, EmbeddingSettings, KnowledgeBaseConfig, LlmProvider, LlmSettings,
};
pub use conversation::{ConversationEngine, ConversationMemory, Exchange, DEFAULT_TOP_K};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ChatError, IndexError, IngestError, KnowledgeBaseError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexEntry, VectorIndex};
pub use ingest::{discover_pdf_files, extract_documents, sources_from_folder, ExtractionReport};
pub use models::{
    AnswerResult, DocumentSource, IngestResult, Prompt, PromptMessage, RetrievedChunk, Role,
    SkippedDocument, StatusSnapshot, Turn,
};
pub use orchestrator::{KnowledgeBase, Recovery};
pub use providers::{GeminiChat, OllamaEmbedder, OpenAiCompatibleChat};
pub use traits::{Embedder, LanguageModel};
