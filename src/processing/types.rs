//! Core data types and error definitions for document processing.

use thiserror::Error;

/// Extracted text for a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number as reported by the PDF.
    pub page_number: u32,
    /// Raw text extracted from the page.
    pub text: String,
}

/// A bounded slice of page text, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Normalized chunk text, at most the configured window size.
    pub text: String,
    /// Page the chunk was sliced from.
    pub page_number: u32,
    /// Dense zero-based index across the whole document.
    pub chunk_index: usize,
}

/// Errors produced while slicing pages into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A zero-character window can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The window would never advance past the overlap.
    #[error("chunk overlap ({overlap}) must be smaller than the chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured window size in characters.
        chunk_size: usize,
        /// Configured overlap in characters.
        overlap: usize,
    },
}

/// Errors raised while extracting text from PDF bytes.
#[derive(Debug, Error)]
pub enum PdfError {
    /// The bytes could not be parsed as a PDF document.
    #[error("failed to parse PDF: {0}")]
    Unreadable(String),
}
