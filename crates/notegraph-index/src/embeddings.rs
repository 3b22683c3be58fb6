//! Embedding provider abstraction.
//!
//! Indexing batches chunk contents into one provider call per batch; a
//! provider failure is never fatal — the orchestrator logs it and
//! proceeds with un-embedded chunks so keyword search stays available.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Provider of fixed-length embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input text, in order.
    ///
    /// Must tolerate empty input by returning an empty batch. The
    /// `cacheable` flag hints that the texts are document content whose
    /// vectors are worth caching, as opposed to one-off query strings.
    async fn embed_batch(&self, texts: &[String], cacheable: bool) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()], false).await?;
        vectors
            .pop()
            .context("embedding provider returned no vector")
    }

    /// Output vector dimensions.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Largest batch the provider accepts per call.
    fn max_batch_size(&self) -> usize {
        32
    }
}

/// Configuration for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingsConfig {
    /// Base URL, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    /// Bearer token (optional for local servers)
    pub api_key: Option<String>,
    /// Model name sent with each request
    pub model: String,
    /// Vector dimensions the model produces
    pub dimensions: usize,
}

/// Embedding provider backed by an OpenAI-compatible `/embeddings` API.
pub struct HttpEmbeddings {
    client: reqwest::Client,
    config: HttpEmbeddingsConfig,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddings {
    pub fn new(config: HttpEmbeddingsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddings {
    async fn embed_batch(&self, texts: &[String], _cacheable: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting {} embeddings from {}",
            texts.len(),
            self.config.model
        );

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingsResponse = request
            .send()
            .await
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding endpoint returned an error status")?
            .json()
            .await
            .context("failed to decode embedding response")?;

        let mut items = response.data;
        items.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();

        anyhow::ensure!(
            vectors.len() == texts.len(),
            "embedding endpoint returned {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        );
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Deterministic provider for tests and offline runs.
///
/// Vectors are normalized bag-of-words histograms over hash buckets, so
/// texts sharing vocabulary land near each other under cosine distance
/// and repeat calls are bit-identical.
pub struct MockEmbeddings {
    dimensions: usize,
}

impl MockEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a, enough to spread words across buckets deterministically
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed_batch(&self, texts: &[String], _cacheable: bool) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimensions];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    vector[self.bucket(&word.to_lowercase())] += 1.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                }
                vector
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Provider that always fails, for exercising the degraded-indexing path.
#[cfg(test)]
pub struct FailingEmbeddings;

#[cfg(test)]
#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed_batch(&self, _texts: &[String], _cacheable: bool) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding provider unavailable")
    }

    fn dimensions(&self) -> usize {
        32
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}
