//! Question-answering orchestration.
//!
//! Glues the retrieval and synthesis stages together for `/ask`: extract a
//! numeric code keyword from the question, retrieve ranked fragments,
//! synthesize the answer, then resolve each source title to its URL through
//! the relational store.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::answer::{generate_answer, Synthesizer};
use crate::config::Config;
use crate::index::VectorIndex;
use crate::models::SourceRef;
use crate::retrieval::{extract_code_keyword, retrieve};

#[derive(Debug, Clone, Serialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<SourceLink>,
    pub context_chunks_used: usize,
}

pub async fn answer_question(
    config: &Config,
    pool: &SqlitePool,
    index: &VectorIndex,
    synthesizer: &dyn Synthesizer,
    question: &str,
) -> Result<AskOutcome> {
    let keyword = extract_code_keyword(question);

    let chunks = retrieve(
        index,
        question,
        config.retrieval.answer_limit,
        keyword.as_deref(),
        config.retrieval.candidate_pool,
    )
    .await;

    if chunks.is_empty() {
        // No relevant content is a valid outcome, not an error.
        return Ok(AskOutcome {
            question: question.to_string(),
            answer: "I could not find any document matching the specific terms of your \
                     search. Please try rephrasing the question."
                .to_string(),
            confidence: 0.1,
            sources: Vec::new(),
            context_chunks_used: 0,
        });
    }

    let result = generate_answer(synthesizer, question, &chunks, config.retrieval.max_sources);
    let sources = resolve_source_urls(pool, &result.sources).await?;

    Ok(AskOutcome {
        question: question.to_string(),
        answer: result.answer,
        confidence: result.confidence,
        sources,
        context_chunks_used: chunks.len(),
    })
}

/// The relational store is authoritative for the title→URL mapping; a title
/// with no row resolves to a placeholder link.
async fn resolve_source_urls(pool: &SqlitePool, sources: &[SourceRef]) -> Result<Vec<SourceLink>> {
    let mut links = Vec::with_capacity(sources.len());

    for source in sources {
        let url: Option<String> = sqlx::query_scalar("SELECT url FROM documents WHERE title = ?")
            .bind(&source.title)
            .fetch_optional(pool)
            .await?;

        links.push(SourceLink {
            title: source.title.clone(),
            url: url.unwrap_or_else(|| "#".to_string()),
        });
    }

    Ok(links)
}
