//! Embedding providers.
//!
//! Same enum-dispatch shape as [`crate::llm::LlmProvider`]: one variant per
//! backend, `build(config, api_key)` as the factory. Every vector returned is
//! L2-normalised so cosine similarity reduces to a dot product.

pub mod hashing;
pub mod openai_compatible;

use crate::config::EmbeddingsConfig;
use crate::llm::ProviderError;

#[derive(Debug, Clone)]
pub enum Embedder {
    OpenAiCompatible(openai_compatible::OpenAiEmbedder),
    Hashing(hashing::HashingEmbedder),
}

impl Embedder {
    /// Embed `texts` in order. The result has exactly one vector per input.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = match self {
            Embedder::OpenAiCompatible(e) => e.embed(texts).await?,
            Embedder::Hashing(e) => texts.iter().map(|t| e.embed(t)).collect(),
        };
        if vectors.len() != texts.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &mut vectors {
            normalize(v);
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| ProviderError::Malformed("no embedding returned".into()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Embedder::OpenAiCompatible(_) => "openai",
            Embedder::Hashing(_) => "hashing",
        }
    }
}

/// Construct an `Embedder` from config.
pub fn build(config: &EmbeddingsConfig, api_key: Option<String>) -> Result<Embedder, ProviderError> {
    match config.provider.as_str() {
        "hashing" => Ok(Embedder::Hashing(hashing::HashingEmbedder::new(
            config.hashing_dimensions,
        )?)),
        "openai" | "openai-compatible" | "ollama" => {
            let oai = &config.openai;
            Ok(Embedder::OpenAiCompatible(openai_compatible::OpenAiEmbedder::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.batch_size,
                oai.timeout_seconds,
                api_key,
            )?))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; `0.0` for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
