//! Answer synthesis from ranked fragments.
//!
//! Reassembles retrieved fragments into one ordered context, recovers the
//! plaintext by stripping the title annotation added at index time, and
//! produces the final [`AnswerResult`] with deduplicated sources and an
//! aggregate confidence score.
//!
//! The answer text itself comes from a [`Synthesizer`]. The shipped
//! [`ExtractiveSynthesizer`] looks for a structured `solution = ...` field;
//! a generative backend can be plugged in behind the same trait without
//! touching retrieval or scoring.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::index::{CONTENT_LABEL, PAGE_TITLE_LABEL};
use crate::models::{AnswerResult, RankedChunk, SourceRef};

/// Produces the answer text for a question given the assembled context.
pub trait Synthesizer: Send + Sync {
    /// `context` is the cleaned, ordered fragment text; `best_title` names
    /// the top-ranked document for fallback phrasing.
    fn synthesize(&self, question: &str, context: &str, best_title: Option<&str>) -> String;
}

/// Label-based extraction: prefer an explicit `solution = value` field,
/// fall back to the full context, then to a templated apology.
pub struct ExtractiveSynthesizer;

impl Synthesizer for ExtractiveSynthesizer {
    fn synthesize(&self, _question: &str, context: &str, best_title: Option<&str>) -> String {
        if let Some(solution) = extract_solution(context) {
            return solution;
        }

        let cleaned = context.trim();
        if !cleaned.is_empty() {
            return cleaned.to_string();
        }

        match best_title {
            Some(title) => format!(
                "I found the document '{}', but could not extract a clear summary from it.",
                title
            ),
            None => "Sorry, I could not find any relevant information.".to_string(),
        }
    }
}

/// Assemble the final answer from ranked fragments. The caller is
/// responsible for ordering: document order on the keyword path, relevance
/// order on the semantic path.
pub fn generate_answer(
    synthesizer: &dyn Synthesizer,
    question: &str,
    chunks: &[RankedChunk],
    max_sources: usize,
) -> AnswerResult {
    if chunks.is_empty() {
        return AnswerResult {
            answer: "Sorry, I could not find any relevant information.".to_string(),
            confidence: 0.0,
            sources: Vec::new(),
        };
    }

    let context = chunks
        .iter()
        .map(|c| clean_fragment(&c.content))
        .collect::<Vec<_>>()
        .join("\n");

    let answer = synthesizer.synthesize(question, &context, Some(&chunks[0].title));
    let sources = extract_sources(chunks, max_sources);
    let confidence = calculate_confidence(chunks);

    AnswerResult {
        answer,
        confidence,
        sources,
    }
}

/// Strip the `Page Title:` annotation and `Content:` label added at index
/// time, recovering the fragment's plaintext.
pub fn clean_fragment(content: &str) -> String {
    let mut text = content;

    if let Some(rest) = text.strip_prefix(PAGE_TITLE_LABEL) {
        // The annotation runs to the first blank line.
        match rest.find("\n\n") {
            Some(pos) => text = &rest[pos + 2..],
            None => text = rest,
        }
    }

    let text = text.trim_start();
    let text = match text.strip_prefix(CONTENT_LABEL) {
        Some(rest) => rest.trim_start(),
        None => text,
    };

    text.trim_end().to_string()
}

/// Locate a `solution = value` field. The value runs until the next
/// `label =` line or the end of the text.
fn extract_solution(context: &str) -> Option<String> {
    static SOLUTION_RE: OnceLock<Regex> = OnceLock::new();
    static NEXT_LABEL_RE: OnceLock<Regex> = OnceLock::new();

    let solution_re = SOLUTION_RE
        .get_or_init(|| Regex::new(r"(?i)solution[ \t]*=[ \t]*").expect("valid regex"));
    let next_label_re =
        NEXT_LABEL_RE.get_or_init(|| Regex::new(r"\n\s*\w+\s*=").expect("valid regex"));

    let m = solution_re.find(context)?;
    let rest = &context[m.end()..];
    let end = next_label_re.find(rest).map(|n| n.start()).unwrap_or(rest.len());
    let value = rest[..end].trim();

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Deduplicate sources by document in first-seen order, then rank by
/// relevance and cap the list.
fn extract_sources(chunks: &[RankedChunk], max_sources: usize) -> Vec<SourceRef> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources: Vec<SourceRef> = Vec::new();

    for chunk in chunks {
        if seen.insert(&chunk.document_id) {
            sources.push(SourceRef {
                title: chunk.title.clone(),
                document_id: chunk.document_id.clone(),
                relevance: chunk.similarity_score,
            });
        }
    }

    sources.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sources.truncate(max_sources);
    sources
}

/// Mean similarity across the whole context window — aggregate retrieval
/// confidence rather than just the top score — clamped to [0, 1] and
/// rounded to two decimals. On the keyword path every score is 1.0, so the
/// mean is exactly 1.0.
fn calculate_confidence(chunks: &[RankedChunk]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }

    let mean: f64 =
        chunks.iter().map(|c| c.similarity_score).sum::<f64>() / chunks.len() as f64;
    ((mean.clamp(0.0, 1.0)) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::enrich;

    fn chunk(doc: &str, title: &str, index: i64, text: &str, score: f64) -> RankedChunk {
        RankedChunk {
            content: enrich(title, text),
            document_id: doc.to_string(),
            title: title.to_string(),
            chunk_index: index,
            similarity_score: score,
        }
    }

    #[test]
    fn test_clean_fragment_strips_annotation() {
        let enriched = enrich("Setup Guide", "Install the agent.");
        assert_eq!(clean_fragment(&enriched), "Install the agent.");
    }

    #[test]
    fn test_clean_fragment_plain_text_untouched() {
        assert_eq!(clean_fragment("Just plain text."), "Just plain text.");
    }

    #[test]
    fn test_extract_solution_until_next_label() {
        let context = "error = 528\nsolution = resubmit the batch\nafter fixing it\ncause = bad header";
        assert_eq!(
            extract_solution(context),
            Some("resubmit the batch\nafter fixing it".to_string())
        );
    }

    #[test]
    fn test_extract_solution_runs_to_end() {
        let context = "intro text\nSolution = restart the service";
        assert_eq!(extract_solution(context), Some("restart the service".to_string()));
    }

    #[test]
    fn test_extract_solution_empty_value_is_none() {
        assert_eq!(extract_solution("solution = \nnext = thing"), None);
        assert_eq!(extract_solution("no labels at all"), None);
    }

    #[test]
    fn test_synthesizer_prefers_solution_field() {
        let s = ExtractiveSynthesizer;
        let answer = s.synthesize(
            "what now?",
            "error = 1\nsolution = do the fix\ncause = x",
            Some("Doc"),
        );
        assert_eq!(answer, "do the fix");
    }

    #[test]
    fn test_synthesizer_falls_back_to_context() {
        let s = ExtractiveSynthesizer;
        let answer = s.synthesize("q", "plain explanation without fields", Some("Doc"));
        assert_eq!(answer, "plain explanation without fields");
    }

    #[test]
    fn test_synthesizer_apology_names_best_title() {
        let s = ExtractiveSynthesizer;
        let answer = s.synthesize("q", "   ", Some("Setup Guide"));
        assert!(answer.contains("Setup Guide"));
    }

    #[test]
    fn test_generate_answer_empty_chunks() {
        let result = generate_answer(&ExtractiveSynthesizer, "q", &[], 3);
        assert_eq!(result.confidence, 0.0);
        assert!(result.sources.is_empty());
        assert!(result.answer.starts_with("Sorry"));
    }

    #[test]
    fn test_sources_dedup_first_seen_relevance() {
        let chunks = vec![
            chunk("doc-a", "Alpha", 0, "text one", 0.9),
            chunk("doc-a", "Alpha", 1, "text two", 0.4),
            chunk("doc-b", "Beta", 0, "text three", 0.7),
        ];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].document_id, "doc-a");
        assert_eq!(result.sources[0].relevance, 0.9);
        assert_eq!(result.sources[1].document_id, "doc-b");
    }

    #[test]
    fn test_sources_sorted_and_capped() {
        let chunks = vec![
            chunk("doc-a", "Alpha", 0, "a", 0.2),
            chunk("doc-b", "Beta", 0, "b", 0.9),
            chunk("doc-c", "Gamma", 0, "c", 0.5),
            chunk("doc-d", "Delta", 0, "d", 0.7),
        ];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        assert_eq!(result.sources.len(), 3);
        assert_eq!(result.sources[0].document_id, "doc-b");
        assert_eq!(result.sources[1].document_id, "doc-d");
        assert_eq!(result.sources[2].document_id, "doc-c");
    }

    #[test]
    fn test_confidence_is_mean_not_max() {
        let chunks = vec![
            chunk("doc-a", "Alpha", 0, "a", 1.0),
            chunk("doc-a", "Alpha", 1, "b", 0.5),
        ];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_clamped_to_unit() {
        // Semantic combined scores can exceed 1.0 once bonuses apply.
        let chunks = vec![chunk("doc-a", "Alpha", 0, "a", 12.67)];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_keyword_path_confidence_is_one() {
        let chunks = vec![
            chunk("doc-a", "Alpha", 0, "a", 1.0),
            chunk("doc-a", "Alpha", 1, "b", 1.0),
        ];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_context_joins_in_received_order() {
        let chunks = vec![
            chunk("doc-a", "Alpha", 0, "first part", 1.0),
            chunk("doc-a", "Alpha", 1, "second part", 1.0),
        ];
        let result = generate_answer(&ExtractiveSynthesizer, "q", &chunks, 3);
        let first = result.answer.find("first part").unwrap();
        let second = result.answer.find("second part").unwrap();
        assert!(first < second);
    }
}
