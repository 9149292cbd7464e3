//! OpenAI-compatible `/v1/embeddings` client (OpenAI, Ollama, LM Studio…).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::llm::ProviderError;
use crate::llm::providers::openai_compatible::check_status;

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    api_base_url: String,
    model: String,
    batch_size: usize,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_base_url: String,
        model: String,
        batch_size: usize,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_base_url, model, batch_size: batch_size.max(1), api_key })
    }

    /// Embed `texts`, `batch_size` at a time, preserving input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_one_batch(batch).await?);
        }
        Ok(out)
    }

    async fn embed_one_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        debug!(model = %self.model, inputs = batch.len(), "sending embeddings request");

        let mut req = self
            .client
            .post(&self.api_base_url)
            .json(&EmbeddingRequest { model: &self.model, input: batch });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "embeddings request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;
        let response = check_status(response).await?;

        let mut parsed = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| ProviderError::Malformed(format!("failed to parse embeddings: {e}")))?;

        if parsed.data.len() != batch.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::json;

    #[tokio::test]
    async fn batches_and_reorders_by_index() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<serde_json::Value>| async move {
                let inputs = body["input"].as_array().unwrap().clone();
                // Answer in reverse order; the client must restore it.
                let data: Vec<_> = inputs
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(i, text)| {
                        let len = text.as_str().unwrap().len() as f32;
                        json!({ "index": i, "embedding": [len, 1.0] })
                    })
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let embedder = OpenAiEmbedder::new(
            format!("http://{addr}/v1/embeddings"),
            "bge-m3".into(),
            2,
            5,
            None,
        )
        .unwrap();
        let texts: Vec<String> = ["a", "bb", "ccc"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
    }
}
