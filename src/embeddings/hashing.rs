//! Offline feature-hashing embedder.
//!
//! Lower-cased alphanumeric tokens are hashed (SHA-256) into one of
//! `dimensions` buckets with a ±1 sign. Deterministic across runs and
//! platforms; good enough for lexical overlap, no model download required.

use sha2::{Digest, Sha256};

use crate::llm::ProviderError;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, ProviderError> {
        if dimensions == 0 {
            return Err(ProviderError::Request("hashing embedder needs dimensions > 0".into()));
        }
        Ok(Self { dimensions })
    }

    /// Raw (unnormalised) bag-of-words vector for `text`.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        v
    }
}
