#![deny(missing_docs)]

//! Core library for the DocChat server.
//!
//! DocChat turns an uploaded PDF into a conversation: the document is split
//! into page-aware chunks, embedded, and indexed in Qdrant; questions are
//! answered by retrieving the closest chunks and generating a grounded reply.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding and generation model clients.
pub mod gateway;
/// Qdrant vector index integration.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Activity counters for ingestion and conversations.
pub mod metrics;
/// PDF extraction and chunking pipeline.
pub mod processing;
/// Sliding-window rate limiting.
pub mod ratelimit;
/// Chat service coordinating the full pipeline.
pub mod service;
/// Uploaded file storage backends.
pub mod storage;
/// SQLite persistence for chats and messages.
pub mod store;
