//! Ollama-backed embedding and generation adapter.

use super::{EmbeddingClient, GatewayError, GenerationClient};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

/// Client for a local or remote Ollama runtime, used for both embeddings and
/// reply generation.
pub struct OllamaGateway {
    client: Ollama,
    model: String,
}

impl OllamaGateway {
    /// Construct a gateway for the given model, optionally targeting a remote runtime.
    pub fn new(model: String, url: Option<&str>) -> Result<Self, GatewayError> {
        let client = match url {
            Some(url) => {
                let parsed = reqwest::Url::parse(url)
                    .map_err(|err| GatewayError::InvalidResponse(format!("bad Ollama URL: {err}")))?;
                let host = format!(
                    "{}://{}",
                    parsed.scheme(),
                    parsed.host_str().unwrap_or("localhost")
                );
                let port = parsed.port().unwrap_or(11434);
                Ollama::new(host, port)
            }
            None => Ollama::default(),
        };

        tracing::debug!(model = %model, "Initialized Ollama gateway");
        Ok(Self { client, model })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaGateway {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "no texts provided".to_string(),
            ));
        }

        let count = texts.len();
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|err| GatewayError::ProviderUnavailable(err.to_string()))?;

        if response.embeddings.len() != count {
            return Err(GatewayError::InvalidResponse(format!(
                "expected {count} embeddings, received {}",
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

#[async_trait]
impl GenerationClient for OllamaGateway {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GatewayError> {
        let request = GenerationRequest::new(self.model.clone(), user_prompt.to_string())
            .system(system_prompt.to_string())
            .options(ModelOptions::default().temperature(0.0));

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|err| GatewayError::ProviderUnavailable(err.to_string()))?;

        Ok(response.response)
    }
}
