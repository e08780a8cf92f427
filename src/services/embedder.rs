//! Embedding backends and the batching layer above them.
//!
//! The embedding model itself is an external collaborator. This module
//! owns only batching and vector-shape discipline: the backend is handed
//! bounded chunks of normalized text, calls run concurrently up to the
//! configured limit, and the merged output preserves input order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingDriver, PipelineConfig};

/// External embedding model contract: one vector per input, same order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Whether the backend is reachable and ready.
    async fn health_check(&self) -> Result<bool, EmbeddingError> {
        Ok(true)
    }
}

/// Create an embedding backend based on configuration.
pub fn create_embedding_backend(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingBackend>, EmbeddingError> {
    match config.driver {
        EmbeddingDriver::Http => Ok(Arc::new(HttpEmbeddingBackend::new(config)?)),
        EmbeddingDriver::Hash => Ok(Arc::new(HashEmbeddingBackend::new(
            config.dimension as usize,
        ))),
    }
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest {
    inputs: Vec<String>,
    dimension: u32,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Client for an HTTP embedding server.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingBackend {
    client: Client,
    base_url: String,
    dimension: u32,
}

impl HttpEmbeddingBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts.to_vec(),
            dimension: self.dimension,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(embed_response.0)
    }

    async fn health_check(&self) -> Result<bool, EmbeddingError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// Deterministic local embedding driver.
///
/// Each text maps to a sha256-seeded unit vector. Vectors mix a shared
/// anchor direction with a text-specific perturbation, so a corpus
/// embedded locally stays mutually coherent under the cosine gate.
#[derive(Debug, Clone)]
pub struct HashEmbeddingBackend {
    dimension: usize,
}

/// Weight of the shared anchor direction in hash-driver vectors.
const ANCHOR_WEIGHT: f32 = 0.99;

impl HashEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        // Expand the digest into enough pseudo-random bytes for the
        // perturbation component.
        let mut bytes = Vec::with_capacity(self.dimension * 4);
        let mut counter: u64 = 0;
        while bytes.len() < self.dimension * 4 {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            bytes.extend_from_slice(&hasher.finalize());
            counter += 1;
        }

        let mut perturbation: Vec<f32> = bytes
            .chunks_exact(4)
            .take(self.dimension)
            .map(|chunk| {
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();

        let norm = perturbation.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut perturbation {
                *v /= norm;
            }
        }

        let anchor = 1.0 / (self.dimension as f32).sqrt();
        let noise_weight = (1.0 - ANCHOR_WEIGHT * ANCHOR_WEIGHT).sqrt();
        let mut vector: Vec<f32> = perturbation
            .iter()
            .map(|p| ANCHOR_WEIGHT * anchor + noise_weight * p)
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        for v in &mut vector {
            *v /= norm;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Batching layer over an embedding backend.
///
/// Splits input into sub-batches issued concurrently up to the configured
/// limit, merges results in input order, and enforces shape discipline on
/// whatever the backend returns.
pub struct BatchEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    dimension: usize,
    max_batch_size: usize,
    concurrency: usize,
    call_timeout: Duration,
}

impl BatchEmbedder {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        embedding: &EmbeddingConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            backend,
            dimension: embedding.dimension as usize,
            max_batch_size: pipeline.batch_size as usize,
            concurrency: pipeline.concurrency_limit as usize,
            call_timeout: Duration::from_secs(embedding.timeout_secs),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a batch of normalized texts, preserving input order:
    /// `result[i]` embeds `texts[i]`.
    ///
    /// Any backend failure fails the whole batch; the orchestrator decides
    /// how to retry.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = texts
            .len()
            .div_ceil(self.concurrency)
            .clamp(1, self.max_batch_size);

        let chunks: Vec<Vec<String>> = texts.chunks(chunk_size).map(<[String]>::to_vec).collect();

        let results: Vec<Vec<Vec<f32>>> = stream::iter(chunks.into_iter().map(|chunk| {
            let backend = Arc::clone(&self.backend);
            let timeout = self.call_timeout;
            async move {
                tokio::time::timeout(timeout, backend.embed(&chunk))
                    .await
                    .map_err(|_| EmbeddingError::Timeout)?
            }
        }))
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        let vectors: Vec<Vec<f32>> = results.into_iter().flatten().collect();

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                got: bad.len(),
            });
        }

        Ok(vectors)
    }

    /// Embed a single text, for query-side use.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let vectors = self.embed_batch(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::quality::cosine_similarity;

    fn configs(dimension: u32, batch_size: u32, concurrency: u32) -> (EmbeddingConfig, PipelineConfig) {
        let embedding = EmbeddingConfig {
            dimension,
            ..Default::default()
        };
        let pipeline = PipelineConfig {
            batch_size,
            concurrency_limit: concurrency,
            ..Default::default()
        };
        (embedding, pipeline)
    }

    /// Encodes each input's batch position into the vector so order
    /// scrambling would be visible.
    struct EchoBackend {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingBackend for EchoBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let seed: f32 = t.parse().unwrap_or(0.0);
                    vec![seed; self.dimension]
                })
                .collect())
        }
    }

    struct ShortBackend;

    #[async_trait]
    impl EmbeddingBackend for ShortBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct WrongDimensionBackend;

    #[async_trait]
    impl EmbeddingBackend for WrongDimensionBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 2.0, 3.0]).collect())
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl EmbeddingBackend for SlowBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let (embedding, pipeline) = configs(2, 16, 3);
        let embedder = BatchEmbedder::new(Arc::new(EchoBackend { dimension: 2 }), &embedding, &pipeline);

        let texts: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), texts.len());
        for (i, vector) in vectors.iter().enumerate() {
            assert_eq!(vector[0], i as f32);
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (embedding, pipeline) = configs(2, 16, 2);
        let embedder = BatchEmbedder::new(Arc::new(EchoBackend { dimension: 2 }), &embedding, &pipeline);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_detected() {
        let (embedding, pipeline) = configs(2, 16, 1);
        let embedder = BatchEmbedder::new(Arc::new(ShortBackend), &embedding, &pipeline);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = embedder.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::CountMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_detected() {
        let (embedding, pipeline) = configs(2, 16, 1);
        let embedder = BatchEmbedder::new(Arc::new(WrongDimensionBackend), &embedding, &pipeline);
        let texts = vec!["a".to_string()];
        let err = embedder.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_surfaces_as_retryable() {
        use crate::utils::retry::Retryable;

        let (mut embedding, pipeline) = configs(2, 16, 1);
        embedding.timeout_secs = 1;
        let embedder = BatchEmbedder::new(Arc::new(SlowBackend), &embedding, &pipeline);
        let err = embedder
            .embed_batch(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_hash_backend_deterministic_unit_vectors() {
        let backend = HashEmbeddingBackend::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let first = backend.embed(&texts).await.unwrap();
        let second = backend.embed(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);

        for vector in &first {
            assert_eq!(vector.len(), 64);
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_hash_backend_corpus_is_coherent() {
        let backend = HashEmbeddingBackend::new(128);
        let texts: Vec<String> = (0..8).map(|i| format!("entity {}", i)).collect();
        let vectors = backend.embed(&texts).await.unwrap();
        for pair in vectors.windows(2) {
            assert!(cosine_similarity(&pair[0], &pair[1]) > 0.95);
        }
    }
}
