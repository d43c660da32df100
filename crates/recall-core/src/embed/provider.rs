//! Embedding providers: the OpenAI HTTP API and a deterministic stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::error::EmbedError;

/// One text queued for embedding, paired with its content hash.
#[derive(Debug, Clone)]
pub struct EmbedItem {
    pub text: String,
    pub text_hash: String,
}

/// A batch-embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch, returning one vector per input in order.
    async fn embed_batch(&self, batch: &[EmbedItem]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Model identifier used for cache keys and price lookup.
    fn model(&self) -> &str;

    /// Expected vector dimension for this model.
    fn dimension(&self) -> usize;
}

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const CLIENT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings over HTTP.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, model: String, dimension: usize) -> Self {
        Self::with_base_url(OPENAI_API_BASE.to_string(), api_key, model, dimension)
    }

    pub fn with_base_url(
        base_url: String,
        api_key: String,
        model: String,
        dimension: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, batch: &[EmbedItem]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: batch.iter().map(|item| item.text.as_str()).collect(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Provider {
                message: e.to_string(),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Rate limits and server-side failures are worth retrying.
            let transient = status.as_u16() == 429 || status.is_server_error();
            return Err(EmbedError::Provider {
                message: format!("{}: {}", status, body),
                transient,
            });
        }

        let parsed: EmbeddingsResponse =
            response.json().await.map_err(|e| EmbedError::Provider {
                message: format!("malformed embeddings response: {}", e),
                transient: false,
            })?;

        if parsed.data.len() != batch.len() {
            return Err(EmbedError::CountMismatch {
                expected: batch.len(),
                got: parsed.data.len(),
            });
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic stub provider: unit-norm pseudo-vectors derived from the
/// item's content hash. Test-only behaviour, never a production path.
#[derive(Debug, Clone)]
pub struct StubEmbeddings {
    model: String,
    dimension: usize,
}

impl StubEmbeddings {
    pub fn new(model: String, dimension: usize) -> Self {
        Self { model, dimension }
    }

    fn stub_vector(&self, text_hash: &str) -> Vec<f32> {
        let hash_bytes = match decode_hex(text_hash) {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => Sha256::digest(text_hash.as_bytes()).to_vec(),
        };

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let byte = hash_bytes[i % hash_bytes.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect();

        let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed_batch(&self, batch: &[EmbedItem]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(batch
            .iter()
            .map(|item| self.stub_vector(&item.text_hash))
            .collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
