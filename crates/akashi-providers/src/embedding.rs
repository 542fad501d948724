// crates/akashi-providers/src/embedding.rs
// ============================================================================
// Module: Embedding Providers
// Description: External, local, and deterministic no-op embedding providers.
// Purpose: Produce decision and outcome vectors for indexing and scoring.
// Dependencies: akashi-core, reqwest, serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! Three providers implement the core embedding interface: an external
//! OpenAI-compatible API (batched), a local Ollama-compatible endpoint
//! (one request per text), and a deterministic no-op provider that derives
//! unit vectors from content hashes. Every provider validates returned
//! dimensionality fail-closed; a vector of the wrong size never reaches
//! the index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use akashi_core::EmbeddingError;
use akashi_core::EmbeddingProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: External Provider
// ============================================================================

/// Options for the external OpenAI-compatible embeddings API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEmbeddingsOptions {
    /// API base URL, e.g. `https://api.openai.com/v1`.
    pub api_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Embedding model.
    pub model: String,
    /// Target dimensionality.
    pub dimensions: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// One embedding row in an external API response.
#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    /// Row index within the request batch.
    index: usize,
    /// The embedding vector.
    embedding: Vec<f32>,
}

/// External API response body.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    /// Embedding rows, possibly out of order.
    data: Vec<EmbeddingRow>,
}

/// External OpenAI-compatible embeddings provider.
pub struct ExternalEmbeddings {
    /// Provider options.
    options: ExternalEmbeddingsOptions,
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl ExternalEmbeddings {
    /// Builds the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Request`] when the client cannot be built.
    pub fn new(options: ExternalEmbeddingsOptions) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| EmbeddingError::Request(err.to_string()))?;
        Ok(Self {
            options,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ExternalEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::Response("empty embedding batch".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.options.api_url.trim_end_matches('/'));
        let body = json!({
            "model": self.options.model,
            "input": texts,
            "dimensions": self.options.dimensions,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.options.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    EmbeddingError::Unavailable(err.to_string())
                } else {
                    EmbeddingError::Request(err.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Response(format!("embeddings returned {status}")));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Response(err.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Response(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            if row.embedding.len() != self.options.dimensions {
                return Err(EmbeddingError::Response(format!(
                    "embedding has {} dimensions, expected {}",
                    row.embedding.len(),
                    self.options.dimensions
                )));
            }
            vectors.push(row.embedding);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

// ============================================================================
// SECTION: Local Provider
// ============================================================================

/// Options for the local Ollama-compatible embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEmbeddingsOptions {
    /// Endpoint base URL, e.g. `http://127.0.0.1:11434`.
    pub url: String,
    /// Embedding model.
    pub model: String,
    /// Expected dimensionality of the model's output.
    pub dimensions: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Local endpoint response body.
#[derive(Debug, Deserialize)]
struct LocalEmbeddingResponse {
    /// The embedding vector.
    embedding: Vec<f32>,
}

/// Local Ollama-compatible embeddings provider.
pub struct LocalEmbeddings {
    /// Provider options.
    options: LocalEmbeddingsOptions,
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl LocalEmbeddings {
    /// Builds the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Request`] when the client cannot be built.
    pub fn new(options: LocalEmbeddingsOptions) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| EmbeddingError::Request(err.to_string()))?;
        Ok(Self {
            options,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.options.url.trim_end_matches('/'));
        let body = json!({"model": self.options.model, "prompt": text});
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| EmbeddingError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Response(format!("local embeddings returned {status}")));
        }
        let parsed: LocalEmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Response(err.to_string()))?;
        if parsed.embedding.len() != self.options.dimensions {
            return Err(EmbeddingError::Response(format!(
                "local embedding has {} dimensions, expected {}",
                parsed.embedding.len(),
                self.options.dimensions
            )));
        }
        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

// ============================================================================
// SECTION: Noop Provider
// ============================================================================

/// Deterministic hash-derived embeddings.
///
/// # Invariants
/// - Equal texts produce equal unit vectors; distinct texts almost surely
///   differ. Useful for tests and environments without a real provider.
pub struct NoopEmbeddings {
    /// Output dimensionality.
    dimensions: usize,
}

impl NoopEmbeddings {
    /// Builds the provider with the given dimensionality.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
        }
    }

    /// Derives the deterministic unit vector for one text.
    fn derive(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut seed = Sha256::digest(text.as_bytes());
        while values.len() < self.dimensions {
            for byte in seed.iter().copied() {
                if values.len() == self.dimensions {
                    break;
                }
                values.push((f32::from(byte) / 127.5) - 1.0);
            }
            seed = Sha256::digest(&seed);
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.derive(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.derive(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        reason = "Test-only panic-based assertions and exact float checks are permitted."
    )]

    use akashi_core::EmbeddingProvider;

    use super::NoopEmbeddings;

    #[tokio::test]
    async fn noop_is_deterministic_and_unit_norm() {
        let provider = NoopEmbeddings::new(64);
        let a = provider.embed("Use Redis").await.expect("embed");
        let b = provider.embed("Use Redis").await.expect("embed");
        let c = provider.embed("Use Memcached").await.expect("embed");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        let norm: f64 = a.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn noop_batches_preserve_order() {
        let provider = NoopEmbeddings::new(16);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = provider.embed_batch(&texts).await.expect("batch");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], provider.embed("a").await.expect("embed"));
        assert_eq!(batch[2], provider.embed("c").await.expect("embed"));
    }
}
