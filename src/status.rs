//! Knowledge-base status and document listing.
//!
//! Document and chunk counts with a coarse readiness indicator, used by
//! both `wikidex status` and `GET /status`, plus the document listing
//! behind `wikidex documents` and `GET /documents`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub documents: i64,
    pub chunks: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: i64,
}

pub async fn knowledge_base_status(pool: &SqlitePool) -> Result<StatusReport> {
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;

    let status = if documents > 0 { "ready" } else { "empty" };

    Ok(StatusReport {
        documents,
        chunks,
        status: status.to_string(),
    })
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
    let rows = sqlx::query("SELECT id, title, url, created_at FROM documents ORDER BY title ASC")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| DocumentSummary {
            id: row.get("id"),
            title: row.get("title"),
            url: row.get("url"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Run the status command: query the database and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let report = knowledge_base_status(&pool).await?;

    println!("wikidex — Knowledge Base Status");
    println!("===============================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Documents:  {}", report.documents);
    println!("  Chunks:     {}", report.chunks);
    println!("  Status:     {}", report.status);
    println!();

    pool.close().await;
    Ok(())
}

/// Run the documents command: list every indexed document.
pub async fn run_documents(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let documents = list_documents(&pool).await?;

    if documents.is_empty() {
        println!("No documents indexed.");
    } else {
        println!("{:<38} {:<40} URL", "ID", "TITLE");
        println!("{}", "-".repeat(100));
        for doc in &documents {
            println!("{:<38} {:<40} {}", doc.id, doc.title, doc.url);
        }
    }

    pool.close().await;
    Ok(())
}
