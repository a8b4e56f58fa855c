//! Boundary-preferring text chunker with fixed overlap.
//!
//! Splits a document's extracted text into [`Chunk`]s of roughly
//! `chunk_size` characters, each carrying `overlap` characters from the
//! tail of the previous chunk. Splits land on paragraph breaks (`\n\n`)
//! when possible, then sentence ends, then whitespace, and only fall back
//! to a hard cut for unbroken runs.
//!
//! For identical input and parameters the boundaries are reproducible, and
//! concatenating the non-overlapping spans in ordinal order reconstructs
//! the original text exactly.
//!
//! Each chunk receives a UUID plus a SHA-256 hash of its text for
//! staleness detection, and records its character offsets into the source.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping chunks. Returns chunks with contiguous
/// ordinals starting at 0; always returns at least one chunk.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(chunk_size > overlap, "chunk_size must exceed overlap");

    if text.is_empty() {
        return vec![make_chunk(document_id, 0, "", 0, 0)];
    }

    let len = text.len();
    let mut chunks = Vec::new();
    let mut pos = 0usize;
    let mut ordinal = 0i64;

    while pos < len {
        let mut end = (pos + chunk_size).min(len);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        // A single multi-byte char wider than the budget still advances.
        if end <= pos {
            end = pos
                + text[pos..]
                    .chars()
                    .next()
                    .map(|c| c.len_utf8())
                    .unwrap_or(1);
        }
        if end < len {
            end = find_split(text, pos, end, chunk_size);
        }

        chunks.push(make_chunk(document_id, ordinal, &text[pos..end], pos, end));
        ordinal += 1;

        if end >= len {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        while !text.is_char_boundary(next) {
            next += 1;
        }
        // Progress beats overlap: never step back to or before the
        // previous start.
        if next <= pos {
            next = end;
        }
        pos = next;
    }

    chunks
}

/// Pick a split point at or before `end`, preferring natural boundaries.
fn find_split(text: &str, pos: usize, end: usize, chunk_size: usize) -> usize {
    let window = &text[pos..end];

    if let Some(idx) = window.rfind("\n\n") {
        let split = idx + 2;
        if split >= chunk_size / 2 {
            return pos + split;
        }
    }

    let sentence = [". ", "! ", "? ", "\n"]
        .iter()
        .filter_map(|sep| window.rfind(sep).map(|i| i + sep.len()))
        .max();
    if let Some(split) = sentence {
        if split >= chunk_size / 3 {
            return pos + split;
        }
    }

    if let Some(idx) = window.rfind(' ') {
        return pos + idx + 1;
    }

    end
}

fn make_chunk(document_id: &str, ordinal: i64, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        ordinal,
        text: text.to_string(),
        start_offset: start,
        end_offset: end,
        page: None,
        hash,
    }
}
