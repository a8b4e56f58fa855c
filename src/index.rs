//! In-memory vector index with SQLite persistence.
//!
//! The index owns the active document session: one or more ingested
//! documents, their chunks, and one embedding per chunk. A rebuild
//! constructs a fresh index aside and the caller swaps it in whole, so a
//! reader never observes a partially rebuilt index. Reloading a persisted
//! index reproduces identical query rankings — similarity is recomputed
//! from the stored vectors, nothing is retrained.

use anyhow::{bail, Result};
use chrono::DateTime;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, DocMetadata, Document, FormatTag, IndexEntry, SearchHit};

#[derive(Debug, Clone)]
pub struct VectorIndex {
    documents: Vec<Document>,
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl VectorIndex {
    /// Build a fresh index for a single document, replacing any prior
    /// session once the caller swaps it in.
    pub fn build(
        document: Document,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let mut index = Self {
            documents: Vec::new(),
            entries: Vec::new(),
            dims: embeddings.first().map(|e| e.len()).unwrap_or(0),
        };
        index.append(document, chunks, embeddings)?;
        Ok(index)
    }

    /// Add another document's chunks to the session.
    pub fn append(
        &mut self,
        document: Document,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "chunk/embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }
        for embedding in &embeddings {
            if self.dims == 0 {
                self.dims = embedding.len();
            } else if embedding.len() != self.dims {
                bail!(
                    "embedding dims mismatch: expected {}, got {}",
                    self.dims,
                    embedding.len()
                );
            }
        }

        self.documents.push(document);
        self.entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexEntry { chunk, embedding }),
        );
        Ok(())
    }

    /// Nearest-neighbor query: at most `min(k, len)` hits, highest
    /// similarity first, ties broken by ascending chunk ordinal. An empty
    /// index returns an empty result, not an error.
    pub fn query(&self, query_vec: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vec, &entry.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.ordinal.cmp(&b.chunk.ordinal))
        });
        hits.truncate(k);
        hits
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Look up the name of the document owning a chunk.
    pub fn document_name(&self, document_id: &str) -> Option<&str> {
        self.documents
            .iter()
            .find(|d| d.id == document_id)
            .map(|d| d.name.as_str())
    }

    // ============ Persistence ============

    /// Persist the whole session, replacing whatever was stored before.
    /// Runs in a single transaction so a concurrent reader sees either the
    /// old session or the new one.
    pub async fn save(&self, pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;

        for doc in &self.documents {
            sqlx::query(
                "INSERT INTO documents (id, name, format, metadata_json, ingested_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(&doc.name)
            .bind(doc.format.as_str())
            .bind(serde_json::to_string(&doc.metadata)?)
            .bind(doc.ingested_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }

        for entry in &self.entries {
            let chunk = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, ordinal, text, start_offset, end_offset, page, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.ordinal)
            .bind(&chunk.text)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(chunk.page.map(|p| p as i64))
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, embedding, dims) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(vec_to_blob(&entry.embedding))
            .bind(self.dims as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load the persisted session, if any.
    pub async fn load(pool: &SqlitePool) -> Result<Option<Self>> {
        let doc_rows = sqlx::query("SELECT id, name, format, metadata_json, ingested_at FROM documents ORDER BY rowid")
            .fetch_all(pool)
            .await?;
        if doc_rows.is_empty() {
            return Ok(None);
        }

        let mut documents = Vec::with_capacity(doc_rows.len());
        for row in &doc_rows {
            let format_str: String = row.get("format");
            let format = FormatTag::from_extension(&format_str).unwrap_or(FormatTag::Txt);
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            let ingested_at: i64 = row.get("ingested_at");

            documents.push(Document {
                id: row.get("id"),
                name: row.get("name"),
                format,
                metadata,
                ingested_at: DateTime::from_timestamp(ingested_at, 0).unwrap_or_default(),
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.ordinal, c.text, c.start_offset, c.end_offset,
                   c.page, c.hash, cv.embedding
            FROM chunks c
            JOIN chunk_vectors cv ON cv.chunk_id = c.id
            ORDER BY c.rowid
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut dims = 0usize;
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            dims = embedding.len();
            let start_offset: i64 = row.get("start_offset");
            let end_offset: i64 = row.get("end_offset");
            let page: Option<i64> = row.get("page");

            entries.push(IndexEntry {
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    ordinal: row.get("ordinal"),
                    text: row.get("text"),
                    start_offset: start_offset as usize,
                    end_offset: end_offset as usize,
                    page: page.map(|p| p as u32),
                    hash: row.get("hash"),
                },
                embedding,
            });
        }

        Ok(Some(Self {
            documents,
            entries,
            dims,
        }))
    }
}
