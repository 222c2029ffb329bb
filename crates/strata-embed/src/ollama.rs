//! Ollama embedding client.
//!
//! Uses `POST /api/embed` (Ollama 0.4+) and falls back to the legacy
//! `POST /api/embeddings` endpoint when the current one is not available.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_memory::{EmbeddingError, EmbeddingProvider};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct LegacyEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LegacyEmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding provider backed by a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    /// Client for `model` at `base_url` returning `dimension`-wide vectors.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model name sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// `Ok(None)` when the server does not serve `/api/embed`.
    async fn embed_current(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| request_error(&self.base_url, err))?;
        let status = response.status();
        if !status.is_success() {
            debug!("ollama /api/embed unavailable, trying legacy endpoint (status={status})");
            return Ok(None);
        }
        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::InvalidResponse(err.to_string()))?;
        Ok(Some(body.embeddings.into_iter().next().unwrap_or_default()))
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LegacyEmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| request_error(&self.base_url, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!(
                "ollama embed failed (status={status}): {body}"
            )));
        }
        let body: LegacyEmbedResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::InvalidResponse(err.to_string()))?;
        Ok(body.embedding)
    }

    fn check(&self, embedding: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embedding = match self.embed_current(text).await? {
            Some(embedding) => embedding,
            None => self.embed_legacy(text).await?,
        };
        let embedding = self.check(embedding)?;
        debug!(
            "embedded text (model={}, text_len={}, dimension={})",
            self.model,
            text.len(),
            embedding.len()
        );
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn request_error(base_url: &str, err: reqwest::Error) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::Request(format!("ollama request timed out ({base_url}): {err}"))
    } else {
        EmbeddingError::Request(format!("ollama not reachable at {base_url}: {err}"))
    }
}
