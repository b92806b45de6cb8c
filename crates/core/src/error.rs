use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index from zero chunks")]
    EmptyInput,

    #[error("failed to persist index at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no persisted index at {}", .0.display())]
    NotFound(PathBuf),

    #[error("persisted index at {} is corrupt: {details}", path.display())]
    CorruptArtifact { path: PathBuf, details: String },

    #[error("index was built with embedding model {index_model} but {query_model} was supplied")]
    ModelMismatch {
        index_model: String,
        query_model: String,
    },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation engine is not bound to a knowledge base")]
    NotBound,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("language model returned an empty answer")]
    EmptyAnswer,

    #[error("credentials for {0} are not configured")]
    MissingCredentials(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ChatError {
    /// Whether the caller should be asked to rephrase instead of being shown a failure.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, ChatError::EmptyQuestion | ChatError::EmptyAnswer)
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("no text could be extracted from the provided documents")]
    NoExtractableText,

    #[error("no knowledge base is available; ingest documents first")]
    NoKnowledgeBase,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl KnowledgeBaseError {
    pub fn is_user_actionable(&self) -> bool {
        match self {
            KnowledgeBaseError::Chat(error) => error.is_user_actionable(),
            _ => false,
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
