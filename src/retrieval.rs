//! Hybrid retrieval over the vector index.
//!
//! Two strategies, selected by query shape before this module is called:
//!
//! - **Keyword-anchored**: a numeric code (e.g. an error number) is assumed
//!   to identify a single canonical document. The keyword locates the best
//!   document; the result is that document's *entire* fragment set in
//!   reading order, each with similarity 1.0. No semantic fallback — if the
//!   keyword matches nothing, the result is empty.
//! - **Semantic**: embed the query, pull an oversized candidate pool, then
//!   re-rank by vector similarity plus per-keyword containment bonuses.
//!
//! Retrieval never propagates a hard failure: any error is logged and
//! degrades to an empty result set.

use anyhow::Result;
use tracing::warn;

use crate::index::VectorIndex;
use crate::models::{IndexedChunk, RankedChunk};

/// Added to a candidate's rank when the keyword also occurs in the document
/// title. Dominates the 0–100 fuzzy term.
const TITLE_KEYWORD_BONUS: f64 = 1000.0;

/// Added to a semantic candidate containing every extracted query keyword.
/// Large enough to outweigh pure vector similarity.
const ALL_KEYWORDS_BONUS: f64 = 10.0;

/// Retrieve ranked fragments for a query. `keyword` switches to the
/// keyword-anchored path; `candidate_pool` sizes the semantic candidate set
/// independently of `limit`.
pub async fn retrieve(
    index: &VectorIndex,
    query: &str,
    limit: usize,
    keyword: Option<&str>,
    candidate_pool: usize,
) -> Vec<RankedChunk> {
    let result = match keyword {
        Some(kw) => keyword_anchored(index, query, kw).await,
        None => semantic(index, query, limit, candidate_pool).await,
    };

    match result {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(error = %e, query, "retrieval failed, returning empty result");
            Vec::new()
        }
    }
}

/// Extract a candidate keyword from a question: the first run of 3 or more
/// consecutive digits (an error or ticket code).
pub fn extract_code_keyword(question: &str) -> Option<String> {
    let mut run = String::new();
    for c in question.chars() {
        if c.is_ascii_digit() {
            run.push(c);
        } else {
            if run.len() >= 3 {
                return Some(run);
            }
            run.clear();
        }
    }
    if run.len() >= 3 {
        return Some(run);
    }
    None
}

/// Lowercase word tokens longer than 3 characters. Short/common words are
/// excluded by length alone, not a stop-word list.
pub fn extract_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_string())
        .collect()
}

/// Fuzzy partial-ratio similarity in 0–100: the best normalized-Levenshtein
/// ratio of the shorter string against every same-length character window of
/// the longer one. An exact substring scores 100.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let window_len = shorter.chars().count();
    let longer_chars: Vec<char> = longer.chars().collect();

    let mut best = 0.0f64;
    for start in 0..=(longer_chars.len() - window_len) {
        let window: String = longer_chars[start..start + window_len].iter().collect();
        let ratio = strsim::normalized_levenshtein(shorter, &window);
        if ratio > best {
            best = ratio;
        }
        if best >= 1.0 {
            break;
        }
    }

    best * 100.0
}

/// Combined semantic score: bounded vector similarity `1/(1+distance)`,
/// +1 per contained query keyword, +10 when every keyword is contained.
pub fn score_semantic(distance: f64, content: &str, keywords: &[String]) -> f64 {
    let content_lower = content.to_lowercase();
    let mut score = 1.0 / (1.0 + distance);

    let matched = keywords
        .iter()
        .filter(|k| content_lower.contains(k.as_str()))
        .count();
    score += matched as f64;

    if !keywords.is_empty() && matched == keywords.len() {
        score += ALL_KEYWORDS_BONUS;
    }

    score
}

async fn keyword_anchored(
    index: &VectorIndex,
    query: &str,
    keyword: &str,
) -> Result<Vec<RankedChunk>> {
    let records = index.scan_all().await?;
    let keyword_lower = keyword.to_lowercase();
    let query_lower = query.to_lowercase();

    // Rank every record containing the keyword; the keyword's only job is
    // to locate the right document, so ties keep the first-seen record.
    let mut best: Option<(usize, f64)> = None;
    for (i, record) in records.iter().enumerate() {
        if !record.content.to_lowercase().contains(&keyword_lower) {
            continue;
        }

        let title_lower = record.title.to_lowercase();
        let mut rank = partial_ratio(&query_lower, &title_lower);
        if title_lower.contains(&keyword_lower) {
            rank += TITLE_KEYWORD_BONUS;
        }

        match best {
            Some((_, best_rank)) if rank <= best_rank => {}
            _ => best = Some((i, rank)),
        }
    }

    let Some((best_idx, _)) = best else {
        return Ok(Vec::new());
    };
    let best_document_id = records[best_idx].document_id.clone();

    // Recover the whole document, not just the matching fragments.
    let mut chunks: Vec<RankedChunk> = records
        .into_iter()
        .filter(|r| r.document_id == best_document_id)
        .map(|r| ranked(r, 1.0))
        .collect();
    chunks.sort_by_key(|c| c.chunk_index);

    Ok(chunks)
}

async fn semantic(
    index: &VectorIndex,
    query: &str,
    limit: usize,
    candidate_pool: usize,
) -> Result<Vec<RankedChunk>> {
    let query_vec = index.embed_query(query).await?;
    let candidates = index.query_by_vector(&query_vec, candidate_pool).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let keywords = extract_keywords(query);

    let mut scored: Vec<(IndexedChunk, f64)> = candidates
        .into_iter()
        .map(|(chunk, distance)| {
            let score = score_semantic(distance, &chunk.content, &keywords);
            (chunk, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    Ok(scored
        .into_iter()
        .map(|(chunk, score)| ranked(chunk, round2(score)))
        .collect())
}

fn ranked(chunk: IndexedChunk, similarity_score: f64) -> RankedChunk {
    RankedChunk {
        content: chunk.content,
        document_id: chunk.document_id,
        title: chunk.title,
        chunk_index: chunk.chunk_index,
        similarity_score,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::index::{self, VectorIndex};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let bytes = t.as_bytes();
                    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
                    vec![
                        bytes.len() as f32,
                        (sum % 97) as f32,
                        bytes.first().copied().unwrap_or(0) as f32,
                        bytes.last().copied().unwrap_or(0) as f32,
                    ]
                })
                .collect())
        }
    }

    async fn test_index() -> VectorIndex {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        index::create_schema(&pool).await.unwrap();
        VectorIndex::with_embedder(pool, Arc::new(StubEmbedder))
    }

    #[test]
    fn test_extract_code_keyword() {
        assert_eq!(extract_code_keyword("What is error 528?"), Some("528".to_string()));
        assert_eq!(extract_code_keyword("ticket 12345 status"), Some("12345".to_string()));
        assert_eq!(extract_code_keyword("code 12 then 999"), Some("999".to_string()));
        assert_eq!(extract_code_keyword("no digits here"), None);
        assert_eq!(extract_code_keyword("v1.2"), None);
        assert_eq!(extract_code_keyword("528"), Some("528".to_string()));
    }

    #[test]
    fn test_extract_keywords_length_filter() {
        let kws = extract_keywords("How to configure VPN access?");
        assert_eq!(kws, vec!["configure".to_string(), "access".to_string()]);
        assert!(extract_keywords("a an the of").is_empty());
    }

    #[test]
    fn test_partial_ratio_exact_substring() {
        let r = partial_ratio("error 528", "error 528 handling guide");
        assert!((r - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ratio_unrelated_is_low() {
        let r = partial_ratio("zzzz", "abcdefgh");
        assert!(r < 50.0, "expected low ratio, got {}", r);
    }

    #[test]
    fn test_partial_ratio_empty() {
        assert_eq!(partial_ratio("", "anything"), 0.0);
    }

    #[test]
    fn test_all_keywords_bonus_dominates_distance() {
        let keywords = vec!["boleto".to_string(), "sicredi".to_string()];
        // Close vector, no keyword coverage.
        let close_miss = score_semantic(0.05, "Page Title: Other\n\nContent: unrelated text", &keywords);
        // Distant vector, full keyword coverage.
        let far_hit = score_semantic(
            0.5,
            "Page Title: Billing\n\nContent: boleto sicredi setup",
            &keywords,
        );
        assert!(
            far_hit > close_miss,
            "full coverage ({}) must outrank pure similarity ({})",
            far_hit,
            close_miss
        );
        // 1/(1+0.5) + 2 + 10 vs 1/(1+0.05)
        assert!(far_hit > 12.0 && close_miss < 1.0);
    }

    #[test]
    fn test_no_keywords_no_bonus() {
        let score = score_semantic(0.0, "anything", &[]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_keyword_path_recovers_whole_document() {
        let idx = test_index().await;
        idx.insert(
            "doc-528",
            "Error 528 Handling",
            &[
                "Overview of the failure mode.".to_string(),
                "Error 528 appears when the upload is rejected.".to_string(),
                "solution = resubmit the batch after fixing the header".to_string(),
            ],
        )
        .await
        .unwrap();
        for (id, title) in [
            ("doc-a", "Setup Guide"),
            ("doc-b", "VPN Access"),
            ("doc-c", "Printer Troubleshooting"),
            ("doc-d", "Release Notes"),
        ] {
            idx.insert(id, title, &[format!("Content for {}.", title)])
                .await
                .unwrap();
        }

        let results = retrieve(&idx, "What is error 528?", 5, Some("528"), 100).await;
        // The whole best document comes back, not just the matching fragment.
        assert_eq!(results.len(), 3);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.document_id, "doc-528");
            assert_eq!(r.chunk_index, i as i64);
            assert_eq!(r.similarity_score, 1.0);
        }
    }

    #[tokio::test]
    async fn test_keyword_title_bonus_selects_document() {
        let idx = test_index().await;
        // Both documents mention 901 in their content; only one carries it
        // in the title.
        idx.insert(
            "doc-mention",
            "General FAQ",
            &["See also error 901 in passing.".to_string()],
        )
        .await
        .unwrap();
        idx.insert(
            "doc-canonical",
            "Error 901 Handling",
            &["Error 901 means the token expired.".to_string()],
        )
        .await
        .unwrap();

        let results = retrieve(&idx, "how to fix 901", 5, Some("901"), 100).await;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.document_id == "doc-canonical"));
    }

    #[tokio::test]
    async fn test_keyword_no_match_returns_empty() {
        let idx = test_index().await;
        idx.insert("doc-a", "Setup Guide", &["Install the agent.".to_string()])
            .await
            .unwrap();

        let results = retrieve(&idx, "what about 777?", 5, Some("777"), 100).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_path_ranks_and_truncates() {
        let idx = test_index().await;
        idx.insert(
            "doc-a",
            "Billing",
            &[
                "boleto sicredi homologation steps".to_string(),
                "unrelated appendix".to_string(),
            ],
        )
        .await
        .unwrap();
        idx.insert("doc-b", "Misc", &["completely different topic".to_string()])
            .await
            .unwrap();

        let results = retrieve(&idx, "homologation steps for boleto sicredi", 2, None, 100).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].similarity_score >= results[1].similarity_score);
        // Full keyword coverage wins regardless of stub-vector distance.
        assert!(results[0].content.contains("boleto sicredi"));
        assert!(results[0].similarity_score > 10.0);
        // Reported score is rounded to 2 decimals.
        let s = results[0].similarity_score;
        assert!((s * 100.0 - (s * 100.0).round()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_semantic_empty_index_returns_empty() {
        let idx = test_index().await;
        let results = retrieve(&idx, "anything at all", 5, None, 100).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_empty() {
        use crate::embedding::DisabledEmbedder;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        index::create_schema(&pool).await.unwrap();
        let idx = VectorIndex::with_embedder(pool, Arc::new(DisabledEmbedder));

        // Semantic path cannot embed the query; the boundary swallows it.
        let results = retrieve(&idx, "semantic question", 5, None, 100).await;
        assert!(results.is_empty());
    }
}
