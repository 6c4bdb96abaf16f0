//! Ingestion pipeline orchestration.
//!
//! Coordinates the full extraction flow: wiki client → wipe → chunking →
//! embedding → storage. Ingestion is a wipe-and-rebuild bulk job: both the
//! relational store and the vector index are cleared before pages are
//! processed. Each page is isolated behind a savepoint — a failing page
//! rolls back its own relational writes and processing continues — and a
//! single outer commit covers all successful pages.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Acquire, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::{build_chunks, split_text};
use crate::config::Config;
use crate::index::VectorIndex;
use crate::models::{Document, WikiPage};
use crate::wiki::MediaWikiClient;

/// Extraction failure taxonomy, mapped onto HTTP statuses by the server.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("wiki URL is required")]
    MissingUrl,
    #[error("failed to authenticate with the wiki")]
    AuthFailed,
    #[error("no content found in the wiki")]
    NoContent,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub documents_processed: u64,
    pub total_chunks_created: u64,
    pub total_pages_found: u64,
}

/// Full extraction: authenticate when credentials are configured, wipe both
/// stores, fetch all pages, then ingest them.
pub async fn run_extract(
    config: &Config,
    pool: &SqlitePool,
    index: &VectorIndex,
    wiki_url: &str,
) -> Result<ExtractReport, ExtractError> {
    if wiki_url.trim().is_empty() {
        return Err(ExtractError::MissingUrl);
    }

    let client = MediaWikiClient::new(wiki_url)?;

    if let Some((username, password)) = config.wiki.credentials() {
        if !client.login(username, password).await? {
            return Err(ExtractError::AuthFailed);
        }
    }

    info!("clearing stores before extraction");
    sqlx::query("DELETE FROM chunks")
        .execute(pool)
        .await
        .map_err(anyhow::Error::from)?;
    sqlx::query("DELETE FROM documents")
        .execute(pool)
        .await
        .map_err(anyhow::Error::from)?;
    index.clear().await?;

    let pages = client.extract_all().await?;
    if pages.is_empty() {
        return Err(ExtractError::NoContent);
    }

    let report = ingest_pages(config, pool, index, &pages).await?;
    info!(
        documents = report.documents_processed,
        chunks = report.total_chunks_created,
        "extraction finished"
    );
    Ok(report)
}

/// Ingest a list of pages into the (already wiped) stores. Separated from
/// the wiki fetch so tests can drive it with in-process page fixtures.
pub async fn ingest_pages(
    config: &Config,
    pool: &SqlitePool,
    index: &VectorIndex,
    pages: &[WikiPage],
) -> Result<ExtractReport> {
    let mut documents_processed = 0u64;
    let mut total_chunks_created = 0u64;

    let mut tx = pool.begin().await?;

    for page in pages {
        if page.content.trim().is_empty() {
            warn!(title = %page.title, "skipping page with empty content");
            continue;
        }

        match ingest_page(config, &mut tx, index, page).await {
            Ok(chunk_count) => {
                documents_processed += 1;
                total_chunks_created += chunk_count;
                info!(title = %page.title, chunks = chunk_count, "page indexed");
            }
            Err(e) => {
                warn!(title = %page.title, error = %e, "page failed, rolled back");
            }
        }
    }

    tx.commit().await?;

    Ok(ExtractReport {
        documents_processed,
        total_chunks_created,
        total_pages_found: pages.len() as u64,
    })
}

/// Ingest one page inside a savepoint so a failure undoes only this page's
/// relational writes. Vector-index writes happen in a separate database and
/// are not covered; the next extract's wipe reconciles any orphans.
async fn ingest_page(
    config: &Config,
    tx: &mut Transaction<'_, Sqlite>,
    index: &VectorIndex,
    page: &WikiPage,
) -> Result<u64> {
    let mut sp = tx.begin().await?;

    let result = write_page(config, &mut sp, index, page).await;
    match result {
        Ok(count) => {
            sp.commit().await?;
            Ok(count)
        }
        Err(e) => {
            sp.rollback().await?;
            Err(e)
        }
    }
}

async fn write_page(
    config: &Config,
    sp: &mut Transaction<'_, Sqlite>,
    index: &VectorIndex,
    page: &WikiPage,
) -> Result<u64> {
    let doc = Document {
        id: Uuid::new_v4().to_string(),
        title: page.title.clone(),
        url: page.url.clone(),
        content: page.content.clone(),
        created_at: Utc::now().timestamp(),
    };

    sqlx::query("INSERT INTO documents (id, title, url, content, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.url)
        .bind(&doc.content)
        .bind(doc.created_at)
        .execute(&mut **sp)
        .await?;

    let fragments = split_text(
        &page.content,
        config.chunking.chunk_size,
        config.chunking.overlap,
    );
    let mut chunks = build_chunks(&doc.id, &fragments);

    let embedding_ids = index.insert(&doc.id, &doc.title, &fragments).await?;
    for (chunk, embedding_id) in chunks.iter_mut().zip(embedding_ids) {
        chunk.embedding_id = Some(embedding_id);
    }

    for chunk in &chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash, embedding_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(&chunk.embedding_id)
        .execute(&mut **sp)
        .await?;
    }

    Ok(chunks.len() as u64)
}
