//! Embedding Gateway: turns text into vectors for the Vector Store.
//!
//! Shares the OpenAI-compatible HTTP schema and retry discipline with the
//! chat gateway, against the `/embeddings` endpoint instead of
//! `/chat/completions`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::retry::with_retry;
use crate::types::{ErrorClassifier, PipelineError, Result};

pub struct EmbeddingGateway {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl EmbeddingGateway {
    pub fn new(api_key: String, api_base: String, model: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::upstream("embedding", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            model,
            client,
        })
    }

    /// Embed a single text, retrying transient failures.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::upstream("embedding", "empty embedding response"))
    }

    /// Embed a batch of texts in one request, preserving input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let texts_owned = texts.to_vec();

        let response = with_retry("embedding.embed", || {
            let texts = texts_owned.clone();
            let model = model.clone();
            async move {
                let url = format!("{}/embeddings", self.api_base);
                let request = EmbeddingRequest { model, input: texts };

                let resp = self
                    .client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
                    .header("Content-Type", "application/json")
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| ErrorClassifier::classify("embedding", &e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ErrorClassifier::classify_http_status("embedding", status.as_u16(), &body));
                }

                let parsed: EmbeddingResponse = resp
                    .json()
                    .await
                    .map_err(|e| PipelineError::upstream("embedding", format!("malformed response: {e}")))?;

                debug!(count = parsed.data.len(), "received embeddings");
                Ok(parsed)
            }
        })
        .await?;

        let mut sorted = response.data;
        sorted.sort_by_key(|d| d.index);
        Ok(sorted.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}
