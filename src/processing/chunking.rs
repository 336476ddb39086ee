//! Page-aware sliding-window chunking.
//!
//! Each page is normalized (newline runs collapsed to single spaces) and then sliced
//! independently, so every chunk carries an exact page number. The window spans up to
//! `chunk_size` characters and advances by `chunk_size - overlap`; the final partial
//! chunk of a page is kept. Chunk indexes are dense and zero-based across the whole
//! document.

use super::types::{Chunk, ChunkingError, PageText};

/// Default chunk window in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default overlap between neighboring chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Build a lazy chunk iterator over the given pages.
///
/// The iterator is restartable: each call re-derives chunks from the pages with no
/// shared mutable state. Pages with no extractable text yield zero chunks rather than
/// an error; deciding whether an entirely empty document is a failure is left to the
/// ingestion pipeline.
pub fn chunk_pages(
    pages: &[PageText],
    chunk_size: usize,
    overlap: usize,
) -> Result<ChunkIter<'_>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            overlap,
        });
    }

    Ok(ChunkIter {
        pages,
        chunk_size,
        step: chunk_size - overlap,
        page_idx: 0,
        cursor: None,
        next_index: 0,
    })
}

/// Lazy iterator over document chunks produced by [`chunk_pages`].
pub struct ChunkIter<'a> {
    pages: &'a [PageText],
    chunk_size: usize,
    step: usize,
    page_idx: usize,
    cursor: Option<PageCursor>,
    next_index: usize,
}

struct PageCursor {
    chars: Vec<char>,
    page_number: u32,
    pos: usize,
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                let end = (cursor.pos + self.chunk_size).min(cursor.chars.len());
                let text: String = cursor.chars[cursor.pos..end].iter().collect();
                let chunk = Chunk {
                    text,
                    page_number: cursor.page_number,
                    chunk_index: self.next_index,
                };
                self.next_index += 1;

                if end == cursor.chars.len() {
                    self.cursor = None;
                } else {
                    cursor.pos += self.step;
                }
                return Some(chunk);
            }

            let page = self.pages.get(self.page_idx)?;
            self.page_idx += 1;

            let normalized = normalize_page_text(&page.text);
            if normalized.is_empty() {
                continue;
            }
            self.cursor = Some(PageCursor {
                chars: normalized.chars().collect(),
                page_number: page.page_number,
                pos: 0,
            });
        }
    }
}

/// Collapse newline runs into single spaces and trim the result.
fn normalize_page_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_break = false;
    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            pending_break = true;
            continue;
        }
        if pending_break {
            normalized.push(' ');
            pending_break = false;
        }
        normalized.push(ch);
    }
    normalized.trim().to_string()
}
