//! Document processing: PDF text extraction and page-aware chunking.

pub mod chunking;
pub mod pdf;
pub mod types;

pub use chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, chunk_pages};
pub use types::{Chunk, ChunkingError, PageText, PdfError};
