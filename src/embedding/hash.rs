//! Deterministic feature-hashing embedder.
//!
//! Combines word features (weight 1.0) and character-bigram features
//! (weight 0.5) into an L2-normalised vector using FNV-1a. Texts that share
//! words or spelling produce higher cosine similarity than unrelated texts.
//! Needs no model download and no network, so it backs offline smoke runs
//! and tests.

use async_trait::async_trait;

use super::Embedder;
use crate::error::Result;

pub(crate) const DEFAULT_DIMS: usize = 256;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    /// `dims` of zero is bumped to one.
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();

        for word in lower.split_whitespace() {
            let h = fnv1a(word.as_bytes());
            embedding[(h % self.dims as u64) as usize] += 1.0;
        }

        let bytes = lower.as_bytes();
        for bigram in bytes.windows(2) {
            let h = fnv1a(bigram);
            embedding[(h % self.dims as u64) as usize] += 0.5;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "fnv1a-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// FNV-1a 64-bit.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
