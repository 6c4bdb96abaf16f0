//! The vector index: fragment embeddings plus retrieval metadata.
//!
//! Lives in its own SQLite database file, separate from the relational
//! store — everything needed at retrieval time is durable here, so ranking
//! never consults the relational tables. Nearest-neighbor queries are a
//! full scan with the distance computed in Rust, which is acceptable while
//! the corpus stays in the single-digit thousands of fragments.

use std::sync::Arc;

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, blob_to_vec, l2_distance, vec_to_blob, Embedder};
use crate::models::IndexedChunk;

/// Label prefixing every indexed fragment with its document title.
pub const PAGE_TITLE_LABEL: &str = "Page Title:";
/// Label introducing the fragment body inside the enriched text.
pub const CONTENT_LABEL: &str = "Content:";

/// Title-annotate a fragment before embedding. The enrichment is permanent:
/// the enriched text is what gets embedded, stored, and returned as
/// `content` at retrieval time.
pub fn enrich(title: &str, fragment: &str) -> String {
    format!("{PAGE_TITLE_LABEL} {title}\n\n{CONTENT_LABEL} {fragment}")
}

/// Handle to the vector store and the embedding backend. Constructed once
/// per process and shared by reference; there is no hidden global state.
pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Open the index database and construct the configured embedder.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.index.path).await?;
        create_schema(&pool).await?;
        let embedder: Arc<dyn Embedder> = embedding::create_embedder(&config.embedding)?.into();
        Ok(Self { pool, embedder })
    }

    /// Construct over an existing pool with a caller-supplied embedder.
    pub fn with_embedder(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    /// Embed a query text with the index's embedder.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        embedding::embed_query(self.embedder.as_ref(), text).await
    }

    /// Index a document's fragments. Returns one embedding id per fragment,
    /// in fragment order; an empty fragment list is a no-op returning an
    /// empty list.
    pub async fn insert(
        &self,
        document_id: &str,
        title: &str,
        fragments: &[String],
    ) -> Result<Vec<String>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }

        let enriched: Vec<String> = fragments.iter().map(|f| enrich(title, f)).collect();
        let vectors = self.embedder.embed(&enriched).await?;
        if vectors.len() != fragments.len() {
            anyhow::bail!(
                "embedding count mismatch: {} fragments, {} vectors",
                fragments.len(),
                vectors.len()
            );
        }

        let mut embedding_ids = Vec::with_capacity(fragments.len());
        let mut tx = self.pool.begin().await?;

        for (i, (fragment, vector)) in fragments.iter().zip(vectors.iter()).enumerate() {
            let embedding_id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO vector_index
                    (embedding_id, document_id, title, chunk_index, chunk_length, content, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&embedding_id)
            .bind(document_id)
            .bind(title)
            .bind(i as i64)
            .bind(fragment.chars().count() as i64)
            .bind(&enriched[i])
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;

            embedding_ids.push(embedding_id);
        }

        tx.commit().await?;
        Ok(embedding_ids)
    }

    /// Nearest-neighbor search: full scan, Euclidean distance, ascending.
    pub async fn query_by_vector(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<(IndexedChunk, f64)>> {
        let rows = sqlx::query(
            "SELECT embedding_id, document_id, title, chunk_index, chunk_length, content, embedding
             FROM vector_index",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<(IndexedChunk, f64)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let distance = l2_distance(query_vec, &vector);
                (row_to_chunk(row), distance)
            })
            .collect();

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(limit);

        Ok(candidates)
    }

    /// Materialize every stored record. Keyword-path only.
    pub async fn scan_all(&self) -> Result<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            "SELECT embedding_id, document_id, title, chunk_index, chunk_length, content
             FROM vector_index",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    /// Drop all stored records. The table itself stays in place, so the
    /// index remains queryable and a subsequent insert succeeds.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM vector_index")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> IndexedChunk {
    IndexedChunk {
        embedding_id: row.get("embedding_id"),
        document_id: row.get("document_id"),
        title: row.get("title"),
        chunk_index: row.get("chunk_index"),
        chunk_length: row.get("chunk_length"),
        content: row.get("content"),
    }
}

/// Create the vector-index schema. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_index (
            embedding_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            title TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_length INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vector_index_document ON vector_index(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
