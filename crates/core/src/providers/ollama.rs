use crate::providers::endpoint;
use crate::traits::Embedder;
use crate::IndexError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BATCH_SIZE: usize = 16;

/// Embeddings served by an Ollama instance through `/api/embed`.
pub struct OllamaEmbedder {
    endpoint: Url,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint(base_url, "api/embed")?,
            model: model.into(),
            dimensions,
            client,
        })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::Embedding(format!(
                "ollama returned {} for model {}",
                response.status(),
                self.model
            )));
        }

        let parsed: Value = response.json().await?;
        let vectors = parse_embeddings(&parsed)?;

        if vectors.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut vectors = self.request_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("ollama returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.request_batch(batch).await?);
        }
        Ok(vectors)
    }
}

fn parse_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, IndexError> {
    let rows = payload
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Embedding("response has no `embeddings` array".to_string()))?;

    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| IndexError::Embedding("embedding row is not an array".to_string()))?
                .iter()
                .map(|value| {
                    value.as_f64().map(|number| number as f32).ok_or_else(|| {
                        IndexError::Embedding("embedding contains a non-numeric value".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_payload_is_parsed_in_order() {
        let payload = json!({
            "model": "all-minilm",
            "embeddings": [[0.5, -0.25], [1.0, 0.0]],
        });

        let vectors = parse_embeddings(&payload).unwrap();
        assert_eq!(vectors, vec![vec![0.5, -0.25], vec![1.0, 0.0]]);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_embeddings(&json!({ "error": "model not found" })).is_err());
        assert!(parse_embeddings(&json!({ "embeddings": [["x"]] })).is_err());
        assert!(parse_embeddings(&json!({ "embeddings": [1.0] })).is_err());
    }

    #[test]
    fn model_id_is_namespaced() {
        let embedder = OllamaEmbedder::new(
            "http://localhost:11434",
            "all-minilm",
            384,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.model_id(), "ollama:all-minilm");
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:11434/api/embed");
    }
}
