use crate::models::RetrievedChunk;
use crate::traits::Embedder;
use crate::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub position: usize,
    pub text: String,
    #[serde(with = "widened")]
    pub vector: Vec<f32>,
}

/// Vectors are written as f64 so that the text form parses back to identical f32 values.
mod widened {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vector: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(vector.iter().map(|value| f64::from(*value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let wide = Vec::<f64>::deserialize(deserializer)?;
        Ok(wide.into_iter().map(|value| value as f32).collect())
    }
}

/// In-memory nearest-neighbour index over chunk embeddings.
///
/// An index is built once from a batch of chunks and never mutated; a new batch
/// produces a new index that replaces the old one wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    index_id: Uuid,
    embedding_model: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    checksum: String,
    index: &'a VectorIndex,
}

#[derive(Deserialize)]
struct Artifact {
    format_version: u32,
    checksum: String,
    index: VectorIndex,
}

impl VectorIndex {
    pub async fn build(chunks: Vec<String>, embedder: &dyn Embedder) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let dimensions = embedder.dimensions();
        let vectors = embedder.embed_batch(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (text, vector))| {
                check_dimensions(dimensions, &vector)?;
                Ok(IndexEntry {
                    chunk_id: make_chunk_id(position, &text),
                    position,
                    text,
                    vector,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self {
            index_id: Uuid::new_v4(),
            embedding_model: embedder.model_id(),
            dimensions,
            created_at: Utc::now(),
            entries,
        })
    }

    pub fn index_id(&self) -> Uuid {
        self.index_id
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ensure_compatible(&self, embedder: &dyn Embedder) -> Result<(), IndexError> {
        let query_model = embedder.model_id();
        if query_model != self.embedding_model {
            return Err(IndexError::ModelMismatch {
                index_model: self.embedding_model.clone(),
                query_model,
            });
        }
        if embedder.dimensions() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedder.dimensions(),
            });
        }
        Ok(())
    }

    /// Embeds `text` and returns the `k` closest chunks, nearest first.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        self.ensure_compatible(embedder)?;
        let query_vector = embedder.embed(text).await?;
        self.nearest(&query_vector, k)
    }

    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        check_dimensions(self.dimensions, query_vector)?;

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query_vector, &entry.vector)))
            .collect::<Vec<_>>();

        // stable: equal scores keep insertion order
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(entry, score)| RetrievedChunk {
                chunk_id: entry.chunk_id.clone(),
                position: entry.position,
                text: entry.text.clone(),
                score,
            })
            .collect())
    }

    /// Writes the whole index to `destination`, replacing any previous artifact.
    pub fn save(&self, destination: &Path) -> Result<(), IndexError> {
        let persistence = |source: io::Error| IndexError::Persistence {
            path: destination.to_path_buf(),
            source,
        };

        let payload = serde_json::to_vec(self).map_err(|error| persistence(error.into()))?;
        let artifact = ArtifactRef {
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: digest(&payload),
            index: self,
        };
        let bytes = serde_json::to_vec(&artifact).map_err(|error| persistence(error.into()))?;

        if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persistence)?;
        }

        let staging = staging_path(destination).map_err(persistence)?;
        fs::write(&staging, bytes).map_err(persistence)?;
        if let Err(error) = fs::rename(&staging, destination) {
            let _ = fs::remove_file(&staging);
            return Err(persistence(error));
        }

        info!(
            path = %destination.display(),
            index_id = %self.index_id,
            entries = self.entries.len(),
            "vector index saved"
        );
        Ok(())
    }

    pub fn load(source: &Path) -> Result<Self, IndexError> {
        let bytes = match fs::read(source) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(source.to_path_buf()))
            }
            Err(error) => {
                return Err(IndexError::Persistence {
                    path: source.to_path_buf(),
                    source: error,
                })
            }
        };

        let corrupt = |details: String| IndexError::CorruptArtifact {
            path: source.to_path_buf(),
            details,
        };

        let artifact: Artifact =
            serde_json::from_slice(&bytes).map_err(|error| corrupt(error.to_string()))?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                artifact.format_version
            )));
        }

        let payload =
            serde_json::to_vec(&artifact.index).map_err(|error| corrupt(error.to_string()))?;
        if digest(&payload) != artifact.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let index = artifact.index;
        if index.entries.is_empty() {
            return Err(corrupt("index has no entries".to_string()));
        }
        if let Some(entry) = index
            .entries
            .iter()
            .find(|entry| entry.vector.len() != index.dimensions)
        {
            return Err(corrupt(format!(
                "entry {} has dimension {} instead of {}",
                entry.position,
                entry.vector.len(),
                index.dimensions
            )));
        }

        info!(
            path = %source.display(),
            index_id = %index.index_id,
            entries = index.entries.len(),
            "vector index loaded"
        );
        Ok(index)
    }
}

fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

fn make_chunk_id(position: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((position as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn staging_path(destination: &Path) -> Result<PathBuf, io::Error> {
    let name = destination.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {}", destination.display()),
        )
    })?;
    let mut staging = name.to_os_string();
    staging.push(".tmp");
    Ok(destination.with_file_name(staging))
}
