pub mod gemini;
pub mod ollama;
pub mod openai_compatible;

pub use gemini::GeminiChat;
pub use ollama::OllamaEmbedder;
pub use openai_compatible::OpenAiCompatibleChat;

use crate::config::{EmbeddingProvider, EmbeddingSettings, LlmProvider, LlmSettings};
use crate::embeddings::CharacterNgramEmbedder;
use crate::traits::{Embedder, LanguageModel};
use crate::{ChatError, IndexError};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub fn build_embedder(
    settings: &EmbeddingSettings,
    timeout: Duration,
) -> Result<Arc<dyn Embedder>, IndexError> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::CharNgram => Arc::new(CharacterNgramEmbedder::new(settings.dimensions)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            &settings.base_url,
            &settings.model,
            settings.dimensions,
            timeout,
        )?),
    };
    Ok(embedder)
}

pub fn build_language_model(
    settings: &LlmSettings,
    timeout: Duration,
) -> Result<Arc<dyn LanguageModel>, ChatError> {
    let model: Arc<dyn LanguageModel> = match settings.provider {
        LlmProvider::Gemini => {
            let mut client = GeminiChat::new(
                settings.api_key.clone(),
                &settings.model,
                settings.temperature,
                timeout,
            )?;
            if let Some(base_url) = &settings.base_url {
                client = client.with_base_url(base_url)?;
            }
            Arc::new(client)
        }
        LlmProvider::OpenAiCompatible => {
            let base_url = settings
                .base_url
                .as_deref()
                .unwrap_or(openai_compatible::DEFAULT_BASE_URL);
            Arc::new(OpenAiCompatibleChat::new(
                base_url,
                settings.api_key.clone(),
                &settings.model,
                settings.temperature,
                timeout,
            )?)
        }
    };
    Ok(model)
}

/// Joins `path` under `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base.trim())?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}
