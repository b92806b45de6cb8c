use crate::{ChatError, IndexError, Prompt};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity stored alongside every index built with this embedder.
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> String;

    fn is_configured(&self) -> bool;

    async fn generate(&self, prompt: &Prompt) -> Result<String, ChatError>;
}
