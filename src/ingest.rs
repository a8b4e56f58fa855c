//! Ingestion pipeline: file to extracted pages to chunks to vectors.
//!
//! Pages are joined with blank lines into one continuous text, chunked
//! with overlap, and embedded; each chunk remembers the page it starts on
//! so retrieval results can cite their location. The built index replaces
//! or extends the caller's current one; nothing here touches storage.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::embed_texts;
use crate::error::ExtractError;
use crate::extract::extract_document;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, FormatTag, IngestSummary, Page};

/// Determine the format of a file from its extension.
pub fn detect_format(path: &Path) -> Result<FormatTag, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    FormatTag::from_extension(ext)
        .ok_or_else(|| ExtractError::UnsupportedFormat(path.display().to_string()))
}

/// Ingest one file. With `append` and an existing index the document joins
/// the current session; otherwise a fresh index replaces it. The returned
/// index is fully built before the caller swaps it in, so a failed
/// ingestion leaves the previous session untouched.
pub async fn ingest_file(
    path: &Path,
    config: &Config,
    current: Option<VectorIndex>,
    append: bool,
) -> Result<(VectorIndex, IngestSummary)> {
    let format = detect_format(path)?;
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    let (pages, metadata) = extract_document(&name, &bytes, format, &config.capture)?;

    let (text, page_starts) = join_pages(&pages);

    let document = Document {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        format,
        metadata: metadata.clone(),
        ingested_at: Utc::now(),
    };

    let mut chunks = chunk_text(
        &document.id,
        &text,
        config.chunking.chunk_size,
        config.chunking.overlap,
    );
    assign_pages(&mut chunks, &page_starts, config.chunking.overlap);

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_texts(&config.embedding, &texts).await?;

    let chunk_count = chunks.len();
    let index = match (current, append) {
        (Some(mut index), true) => {
            index.append(document.clone(), chunks, embeddings)?;
            index
        }
        _ => VectorIndex::build(document.clone(), chunks, embeddings)?,
    };

    info!(
        file = %name,
        format = %format,
        chunks = chunk_count,
        "document ingested"
    );

    Ok((
        index,
        IngestSummary {
            document_id: document.id,
            name,
            format,
            metadata,
            chunks: chunk_count,
        },
    ))
}

/// Join pages with blank lines, recording the character offset each page
/// starts at in the combined text.
fn join_pages(pages: &[Page]) -> (String, Vec<(usize, Option<u32>)>) {
    let mut text = String::new();
    let mut starts = Vec::with_capacity(pages.len());

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
        }
        starts.push((text.len(), page.number));
        text.push_str(&page.text);
    }

    (text, starts)
}

/// Tag each chunk with the page its fresh content starts on. A later
/// chunk's first `overlap` characters repeat the previous chunk's tail, so
/// attribution skips past them (clamped to the chunk's end).
fn assign_pages(chunks: &mut [Chunk], page_starts: &[(usize, Option<u32>)], overlap: usize) {
    for chunk in chunks {
        let fresh_start = if chunk.ordinal == 0 {
            chunk.start_offset
        } else {
            (chunk.start_offset + overlap).min(chunk.end_offset)
        };
        chunk.page = page_starts
            .iter()
            .take_while(|(start, _)| *start <= fresh_start)
            .last()
            .and_then(|(_, number)| *number);
    }
}
