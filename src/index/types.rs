//! Shared types used by the vector index client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Metadata persisted alongside every indexed chunk.
///
/// `chat_id` scopes retrieval to one document's content; `page_number` and
/// `chunk_index` reconstruct provenance within the document.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Chat the chunk belongs to (the partition key for retrieval).
    pub chat_id: String,
    /// Owner of the chat.
    pub user_id: String,
    /// Storage identifier of the source file.
    pub file_key: String,
    /// 1-based page the chunk was sliced from.
    pub page_number: u32,
    /// Dense zero-based index across the document.
    pub chunk_index: usize,
    /// Chunk text stored for context assembly.
    pub text: String,
}

/// Prepared entry ready for upserting into the index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Point identifier (uuid).
    pub id: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Chunk metadata stored as the point payload.
    pub metadata: ChunkMetadata,
}

/// Scored chunk returned by a similarity query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Point identifier assigned at upsert time.
    pub id: String,
    /// Similarity score computed by the index.
    pub score: f32,
    /// 1-based page the chunk came from.
    pub page_number: u32,
    /// Dense chunk index within the document.
    pub chunk_index: usize,
    /// Stored chunk text.
    pub text: String,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
        #[serde(default)]
        _count: Option<usize>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
