//! Overlapping boundary-aware text chunker.
//!
//! Splits each [`DocumentPage`] into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks of a page share exactly `chunk_overlap`
//! characters, so context that straddles a cut appears in both neighbours.
//!
//! # Algorithm
//!
//! 1. If the rest of the page fits in `chunk_size` characters, emit it and stop.
//! 2. Otherwise look for a break point in the second half of the window,
//!    preferring (in order) a paragraph break `\n\n`, a line break `\n`,
//!    a sentence end (`. `, `? `, `! `), and a space. Without any of these
//!    the window is cut at exactly `chunk_size` characters.
//! 3. The next window starts `chunk_overlap` characters before the cut.
//!
//! Every chunk is a verbatim slice of the page (no trimming), which keeps the
//! split reversible: the first chunk followed by every later chunk minus its
//! first `chunk_overlap` characters reproduces the page text.
//!
//! # Example
//!
//! ```rust
//! use syllabus::chunk::chunk_page;
//! use syllabus::models::DocumentPage;
//!
//! let page = DocumentPage {
//!     source: "notes.pdf".into(),
//!     path: "notes.pdf".into(),
//!     page: 1,
//!     text: "Hello world.".into(),
//! };
//! let chunks = chunk_page(&page, 1000, 100);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Hello world.");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, DocumentPage};

/// Break candidates, strongest first. Each entry is (pattern, bytes of the
/// pattern that stay with the left-hand chunk).
const SEPARATORS: &[&[(&str, usize)]] = &[
    &[("\n\n", 2)],
    &[("\n", 1)],
    &[(". ", 2), ("? ", 2), ("! ", 2)],
    &[(" ", 1)],
];

/// Chunk every page in order. Output ordering is page order, then chunk order.
pub fn chunk_pages(pages: &[DocumentPage], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| chunk_page(page, chunk_size, chunk_overlap))
        .collect()
}

/// Split one page into overlapping chunks.
///
/// Pages with only whitespace produce no chunks.
pub fn chunk_page(page: &DocumentPage, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_spans(&page.text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| make_chunk(page, i as u32, start, &page.text[start..end]))
        .collect()
}

/// Compute `(start, end)` byte spans for the chunks of `text`.
fn split_spans(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));

    // Byte offset of every char, plus the end of the text.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let total_chars = offsets.len() - 1;

    let mut spans = Vec::new();
    let mut start_char = 0usize;

    loop {
        if total_chars - start_char <= chunk_size {
            spans.push((offsets[start_char], text.len()));
            break;
        }

        let window_end = start_char + chunk_size;
        // Never cut inside the first half, and always leave room for progress past the overlap.
        let min_end = start_char + (chunk_size / 2).max(overlap + 1);
        let end_char = find_break(text, &offsets, min_end, window_end).unwrap_or(window_end);

        spans.push((offsets[start_char], offsets[end_char]));
        start_char = end_char - overlap;
    }

    spans
}

/// Find the char index just after the strongest separator whose split point
/// lands in `[min_end, window_end]`.
fn find_break(text: &str, offsets: &[usize], min_end: usize, window_end: usize) -> Option<usize> {
    let lo = offsets[min_end.min(window_end)];
    let hi = offsets[window_end];

    for group in SEPARATORS {
        let best = group
            .iter()
            .filter_map(|(pattern, keep)| {
                // The separator may begin before `lo` as long as the split lands inside.
                let search_from = lo.saturating_sub(pattern.len());
                let search_from = floor_char_boundary(text, search_from);
                text[search_from..hi]
                    .rfind(pattern)
                    .map(|pos| search_from + pos + keep)
                    .filter(|split| *split >= lo && *split <= hi)
            })
            .max();
        if let Some(split_byte) = best {
            // Separators are ASCII, so the split is a char boundary.
            return offsets.binary_search(&split_byte).ok();
        }
    }
    None
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn make_chunk(page: &DocumentPage, index: u32, start: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let key = format!("{}#{}#{}", page.path, page.page, index);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string();

    Chunk {
        id,
        source: page.source.clone(),
        page: page.page,
        chunk_index: index,
        start,
        text: text.to_string(),
        hash,
    }
}
