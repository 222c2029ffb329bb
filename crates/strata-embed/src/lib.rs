//! HTTP embedding providers.

mod ollama;

/// Ollama embedding client.
pub use ollama::OllamaEmbedder;
