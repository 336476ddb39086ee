//! Embedding and generation model clients.
//!
//! This is the single integration seam for external model providers: the conversation
//! engine and the ingestion pipeline only ever see the [`EmbeddingClient`] and
//! [`GenerationClient`] traits. The Ollama adapter talks to a real runtime; the
//! offline backend produces deterministic vectors for development and tests.

pub mod ollama;

use crate::config::ModelProvider;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by model providers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider could not be reached or answered with a failure.
    #[error("Model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider answered, but not with something usable.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, preserving input order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, GatewayError>;
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a reply from a system instruction and a user prompt.
    ///
    /// Implementations run with zero sampling temperature so answers are reproducible.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
    -> Result<String, GatewayError>;
}

/// Build an embedding client for the configured provider.
pub fn build_embedding_client(
    provider: ModelProvider,
    model: &str,
    dimension: usize,
    ollama_url: Option<&str>,
) -> Result<Box<dyn EmbeddingClient>, GatewayError> {
    match provider {
        ModelProvider::Ollama => Ok(Box::new(ollama::OllamaGateway::new(
            model.to_string(),
            ollama_url,
        )?)),
        ModelProvider::Offline => Ok(Box::new(OfflineEmbeddingClient::new(dimension))),
    }
}

/// Build a generation client for the configured provider.
pub fn build_generation_client(
    provider: ModelProvider,
    model: &str,
    ollama_url: Option<&str>,
) -> Result<Box<dyn GenerationClient>, GatewayError> {
    match provider {
        ModelProvider::Ollama => Ok(Box::new(ollama::OllamaGateway::new(
            model.to_string(),
            ollama_url,
        )?)),
        ModelProvider::Offline => Ok(Box::new(OfflineGenerationClient)),
    }
}

/// Deterministic embedding backend that folds text bytes into a normalized vector.
///
/// Useful when no model runtime is available; identical texts always produce
/// identical vectors, so retrieval behaves predictably in tests.
pub struct OfflineEmbeddingClient {
    dimension: usize,
}

impl OfflineEmbeddingClient {
    /// Construct a deterministic embedding client with the given output dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for OfflineEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, GatewayError> {
        if self.dimension == 0 {
            return Err(GatewayError::InvalidResponse(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }
}

/// Generation backend for offline use; always declines with the grounded fallback.
pub struct OfflineGenerationClient;

#[async_trait]
impl GenerationClient for OfflineGenerationClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, GatewayError> {
        Ok("This information is not available in the document.".to_string())
    }
}
