//! Per-page text extraction from raw PDF bytes.

use super::types::{PageText, PdfError};

/// Extract the text of every page from in-memory PDF bytes.
///
/// Page numbers are 1-based, matching how readers reference pages. Pages without
/// extractable text are returned with empty strings so callers keep exact page
/// numbering; the chunker skips them.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, PdfError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| PdfError::Unreadable(err.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| PageText {
            page_number: idx as u32 + 1,
            text,
        })
        .collect())
}
