use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the DocChat server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores chunk embeddings.
    pub qdrant_url: String,
    /// Name of the shared Qdrant collection holding every chat's chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Model backend used for embeddings and reply generation.
    pub model_provider: ModelProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Optional base URL for a remote Ollama runtime.
    pub ollama_url: Option<String>,
    /// SQLite connection string for chat and message persistence.
    pub database_url: String,
    /// Directory where uploaded PDFs are stored.
    pub storage_root: Option<String>,
    /// Public base URL prefixed onto stored file paths.
    pub storage_public_url: Option<String>,
    /// Optional override for the chunk window size in characters.
    pub chunk_size: Option<usize>,
    /// Optional override for the chunk overlap in characters.
    pub chunk_overlap: Option<usize>,
    /// Optional override for the number of chunks retrieved per question.
    pub retrieval_top_k: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Optional override for the chat-message quota (default 5 per day).
    pub chat_messages_per_day: Option<u32>,
    /// Optional override for the new-chat quota (default 1 per day).
    pub new_chats_per_day: Option<u32>,
    /// Optional override for the history/list read quota (default 10 per minute).
    pub history_reads_per_minute: Option<u32>,
}

/// Supported model backends for embedding and generation.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Local or remote Ollama runtime.
    Ollama,
    /// Deterministic offline backend for development and tests.
    Offline,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            model_provider: load_env("MODEL_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("MODEL_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            generation_model: load_env("GENERATION_MODEL")?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            database_url: load_env("DATABASE_URL")?,
            storage_root: load_env_optional("STORAGE_ROOT"),
            storage_public_url: load_env_optional("STORAGE_PUBLIC_URL"),
            chunk_size: parse_optional("CHUNK_SIZE")?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?,
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?,
            server_port: parse_optional("SERVER_PORT")?,
            chat_messages_per_day: parse_optional("CHAT_MESSAGES_PER_DAY")?,
            new_chats_per_day: parse_optional("NEW_CHATS_PER_DAY")?,
            history_reads_per_minute: parse_optional("HISTORY_READS_PER_MINUTE")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for ModelProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        provider = ?config.model_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_provider_parses_known_values() {
        assert!(matches!(
            "ollama".parse::<ModelProvider>(),
            Ok(ModelProvider::Ollama)
        ));
        assert!(matches!(
            "OFFLINE".parse::<ModelProvider>(),
            Ok(ModelProvider::Offline)
        ));
        assert!("gemini".parse::<ModelProvider>().is_err());
    }
}
