use crate::traits::Embedder;
use crate::IndexError;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

const BOUNDARY: char = '\u{2}';

/// Hashed character-trigram embedder. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        if text.is_empty() {
            return vector;
        }

        // boundary markers give every non-empty text at least one trigram
        let chars: Vec<char> = std::iter::once(BOUNDARY)
            .chain(text.to_lowercase().chars())
            .chain(std::iter::once(BOUNDARY))
            .collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        Ok(self.embed_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, Embedder};

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        let second = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn short_text_still_gets_a_direction() {
        let embedder = CharacterNgramEmbedder::default();
        for text in ["a", "42", "ab"] {
            let vector = embedder.embed_text(text);
            assert!(vector.iter().any(|value| *value > 0.0), "{text} embedded to zero");
        }
        assert!(embedder.embed_text("").iter().all(|value| *value == 0.0));
    }

    #[test]
    fn model_id_reflects_dimensions() {
        assert_eq!(CharacterNgramEmbedder::new(64).model_id(), "char-trigram-64");
        assert_ne!(
            CharacterNgramEmbedder::new(64).model_id(),
            CharacterNgramEmbedder::new(128).model_id()
        );
    }
}
