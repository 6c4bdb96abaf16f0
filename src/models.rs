//! Core data models used throughout wikidex.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and question-answering pipeline.

use serde::Serialize;

/// A page fetched from the wiki before it is persisted.
#[derive(Debug, Clone)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Normalized document stored in SQLite. Title and URL are unique;
/// deleting a document cascades to its chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub created_at: i64,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub embedding_id: Option<String>,
}

/// A record stored in the vector index. `content` is the enriched text
/// (title annotation + fragment) that was embedded; `chunk_length` is the
/// length of the original, non-enriched fragment.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub embedding_id: String,
    pub document_id: String,
    pub title: String,
    pub chunk_index: i64,
    pub chunk_length: i64,
    pub content: String,
}

/// A retrieval result. On the keyword-anchored path `similarity_score` is
/// always 1.0; on the semantic path it is the combined rank score rounded
/// to two decimals, which may exceed 1.0 once keyword bonuses apply.
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub content: String,
    pub document_id: String,
    pub title: String,
    pub chunk_index: i64,
    pub similarity_score: f64,
}

/// A deduplicated answer source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub document_id: String,
    pub relevance: f64,
}

/// The synthesized answer with aggregate confidence and ranked sources.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<SourceRef>,
}
