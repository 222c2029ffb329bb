use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use strata_memory::{EmbeddingError, EmbeddingProvider};

/// Table-driven embedder; unknown texts fail so callers hit their fallback.
#[derive(Debug, Default)]
pub struct StubEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().push(text.to_string());
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::InvalidResponse(format!("no stub vector for {text:?}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Request("embedding service unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
