//! Qdrant vector index integration.

pub mod client;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::VectorIndexClient;
pub use filters::chat_filter;
pub(crate) use payload::generate_point_id;
pub use types::{ChunkMetadata, IndexError, RetrievedChunk, VectorEntry};
