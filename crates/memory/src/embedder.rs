use crate::error::{MemoryError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Text-to-vector capability consumed by [`crate::ProjectMemory`].
///
/// Implementations must produce a fixed-length vector, deterministic for a
/// given model/version, and must not block the scheduler thread while
/// computing (offload heavy work via `spawn_blocking`).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

const HASH_DIMENSION: usize = 256;

/// Deterministic feature-hashing embedder.
///
/// Tokens are hashed into a fixed number of buckets and the resulting count
/// vector is L2-normalized, so cosine distance stays in [0, 2] and texts
/// sharing tokens land close together. No model download, no warm-up; the
/// offline default where a learned model is not configured.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: HASH_DIMENSION,
        }
    }

    fn embed_sync(dimension: usize, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().unwrap_or([0u8; 8]));
            vector[(bucket % dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let dimension = self.dimension;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || Self::embed_sync(dimension, &text))
            .await
            .map_err(|err| MemoryError::Embedding(format!("embedding task failed: {err}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
