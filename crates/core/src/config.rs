use crate::chunking::ChunkingConfig;
use crate::conversation::DEFAULT_TOP_K;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::KnowledgeBaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ARTIFACT_PATH: &str = "vectorstore.json";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProvider {
    #[default]
    CharNgram,
    Ollama,
}

impl EmbeddingProvider {
    /// Vector size the provider's default model produces.
    pub fn default_dimensions(self) -> usize {
        match self {
            Self::CharNgram => DEFAULT_EMBEDDING_DIMENSIONS,
            Self::Ollama => DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS,
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "char-ngram" => Ok(Self::CharNgram),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!(
                "unknown embedding provider `{other}` (expected char-ngram or ollama)"
            )),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CharNgram => f.write_str("char-ngram"),
            Self::Ollama => f.write_str("ollama"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProvider {
    #[default]
    Gemini,
    OpenAiCompatible,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai-compatible" | "openai" => Ok(Self::OpenAiCompatible),
            other => Err(format!(
                "unknown llm provider `{other}` (expected gemini or openai-compatible)"
            )),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::OpenAiCompatible => f.write_str("openai-compatible"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub dimensions: usize,
}

impl EmbeddingSettings {
    pub fn for_provider(provider: EmbeddingProvider) -> Self {
        Self {
            provider,
            model: DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            dimensions: provider.default_dimensions(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::for_provider(EmbeddingProvider::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmSettings {
    pub fn credentials_env_var(&self) -> &'static str {
        match self.provider {
            LlmProvider::Gemini => "GOOGLE_API_KEY",
            LlmProvider::OpenAiCompatible => "OPENAI_API_KEY",
        }
    }

    /// Fills a missing API key from the provider's environment variable.
    pub fn with_env_credentials(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = non_empty_env(self.credentials_env_var());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub artifact_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub condense_follow_ups: bool,
    pub request_timeout: Duration,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            condense_follow_ups: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn validate(&self) -> Result<(), KnowledgeBaseError> {
        self.chunking.validate()?;

        if self.artifact_path.as_os_str().is_empty() {
            return Err(KnowledgeBaseError::InvalidConfig(
                "artifact path must not be empty".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(KnowledgeBaseError::InvalidConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(KnowledgeBaseError::InvalidConfig(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(KnowledgeBaseError::InvalidConfig(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProvider::Ollama
            && self.embedding.model.trim().is_empty()
        {
            return Err(KnowledgeBaseError::InvalidConfig(
                "embedding model name must not be empty".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(KnowledgeBaseError::InvalidConfig(
                "llm model name must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(KnowledgeBaseError::InvalidConfig(format!(
                "temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

pub(crate) fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
