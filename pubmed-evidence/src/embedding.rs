//! Optional semantic similarity via an OpenAI-compatible embeddings endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ModelConfig;
use crate::error::{EvidenceError, Result};
use crate::rank::cosine_similarity;

/// Inputs sent per embeddings request
const BATCH_SIZE: usize = 256;

/// Turns texts into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// One vector per input, in input order
    async fn embed(&self, input: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Cosine similarity of `query` against each of `texts`, aligned to `texts`
pub async fn query_similarities(
    embedder: &dyn Embedder,
    query: &str,
    texts: &[&str],
) -> Result<Vec<f64>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut input = Vec::with_capacity(texts.len() + 1);
    input.push(query);
    input.extend_from_slice(texts);

    let mut vectors = Vec::with_capacity(input.len());
    for batch in input.chunks(BATCH_SIZE) {
        vectors.extend(embedder.embed(batch).await?);
    }
    if vectors.len() != input.len() {
        return Err(EvidenceError::ModelError(format!(
            "expected {} embeddings, got {}",
            input.len(),
            vectors.len()
        )));
    }

    let (query_vector, chunk_vectors) = vectors.split_at(1);
    Ok(chunk_vectors
        .iter()
        .map(|v| cosine_similarity(&query_vector[0], v))
        .collect())
}

pub struct OpenAiEmbedder {
    client: Client,
    config: ModelConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.config.embedding_model
    }

    #[instrument(skip(self, input), fields(model = %self.config.embedding_model, inputs = input.len()))]
    async fn embed(&self, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = %status, "Embeddings request failed");
            return Err(EvidenceError::ModelError(format!(
                "embeddings request failed with {status}: {message}"
            )));
        }

        let mut response: EmbeddingResponse = response.json().await?;
        response.data.sort_by_key(|row| row.index);
        if response.data.len() != input.len() {
            return Err(EvidenceError::ModelError(format!(
                "expected {} embeddings, got {}",
                input.len(),
                response.data.len()
            )));
        }

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "Embedded {} input(s)",
                input.len()
            );
        }
        Ok(response.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorBody {
    pub(crate) error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub(crate) message: String,
}
