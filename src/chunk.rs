//! Paragraph-boundary text chunker with trailing-character overlap.
//!
//! Splits document body text into fragments bounded by a target character
//! size. Splitting occurs on paragraph boundaries (`\n\n`) to preserve
//! semantic coherence; a paragraph that alone exceeds the target is split
//! further at sentence boundaries. Each flushed fragment seeds the next
//! buffer with its trailing `overlap` characters so context carries across
//! fragment edges.
//!
//! Each stored chunk receives a random UUID plus a SHA-256 hash of its text
//! for staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into fragment strings. Output is fully determined by the
/// input and the two size parameters; empty or whitespace-only input
/// produces an empty sequence.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in paragraphs {
        if char_len(&buf) + char_len(para) > chunk_size && !buf.trim().is_empty() {
            flush(&mut chunks, &mut buf, overlap);
        }

        if char_len(para) > chunk_size {
            // Oversized paragraph: same accumulate/flush logic at sentence
            // granularity.
            for sentence in split_sentences(para) {
                if char_len(&buf) + char_len(sentence) > chunk_size && !buf.trim().is_empty() {
                    flush(&mut chunks, &mut buf, overlap);
                }
                buf.push_str(sentence);
                buf.push(' ');
            }
        } else {
            buf.push_str(para);
            buf.push_str("\n\n");
        }
    }

    if !buf.trim().is_empty() {
        chunks.push(buf.trim().to_string());
    }

    chunks
}

/// Flush the buffer as a completed fragment and seed the next buffer with
/// the fragment's trailing `overlap` characters.
fn flush(chunks: &mut Vec<String>, buf: &mut String, overlap: usize) {
    let fragment = buf.trim().to_string();
    let seed = tail_chars(&fragment, overlap).to_string();
    chunks.push(fragment);
    buf.clear();
    buf.push_str(&seed);
}

/// Sentence boundaries are positions following `.`, `!`, or `?` followed by
/// whitespace. The separating whitespace is consumed.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = paragraph.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = iter.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    if end > start {
                        sentences.push(&paragraph[start..end]);
                    }
                    start = end;
                    // Consume the whitespace run between sentences.
                    while let Some(&(j, w)) = iter.peek() {
                        if w.is_whitespace() {
                            iter.next();
                            start = j + w.len_utf8();
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }

    if start < paragraph.len() {
        let rest = paragraph[start..].trim_end();
        if !rest.is_empty() {
            sentences.push(rest);
        }
    }

    sentences
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`, respecting char boundaries.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = char_len(s);
    if total <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(total - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

/// Wrap fragment strings as [`Chunk`]s with contiguous indices starting
/// at 0. `embedding_id` is assigned later, once the fragment is indexed.
pub fn build_chunks(document_id: &str, fragments: &[String]) -> Vec<Chunk> {
    fragments
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: i as i64,
                text: text.clone(),
                hash,
                embedding_id: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_no_fragments() {
        assert!(split_text("", 500, 50).is_empty());
        assert!(split_text("   \n\n  \t ", 500, 50).is_empty());
    }

    #[test]
    fn test_small_text_single_fragment() {
        let fragments = split_text("Hello, world!", 500, 50);
        assert_eq!(fragments, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_paragraphs_under_limit_stay_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let fragments = split_text(text, 500, 50);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("First paragraph."));
        assert!(fragments[0].contains("Third paragraph."));
    }

    #[test]
    fn test_paragraphs_exceed_limit_flush() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let fragments = split_text(text, 30, 0);
        assert!(fragments.len() > 1);
        assert!(fragments[0].starts_with("This is paragraph one."));
    }

    #[test]
    fn test_overlap_seeds_next_fragment() {
        let text = "This is paragraph one.\n\nThis is paragraph two.";
        let fragments = split_text(text, 30, 10);
        assert_eq!(fragments.len(), 2);
        let tail: String = fragments[0]
            .chars()
            .skip(fragments[0].chars().count() - 10)
            .collect();
        assert!(
            fragments[1].starts_with(tail.trim_start()),
            "fragment {:?} should start with overlap tail {:?}",
            fragments[1],
            tail
        );
    }

    #[test]
    fn test_oversized_paragraph_split_at_sentences() {
        let text = "Alpha sentence here. Beta sentence here! Gamma sentence here? Delta sentence.";
        let fragments = split_text(text, 45, 0);
        assert!(fragments.len() > 1);
        for f in &fragments {
            assert!(!f.is_empty());
        }
        // All sentences survive, in order.
        let joined = fragments.join(" ");
        for s in ["Alpha", "Beta", "Gamma", "Delta"] {
            assert!(joined.contains(s), "missing sentence {} in {:?}", s, joined);
        }
        let a = joined.find("Alpha").unwrap();
        let d = joined.find("Delta").unwrap();
        assert!(a < d);
    }

    #[test]
    fn test_paragraph_order_preserved() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let fragments = split_text(&text, 60, 0);
        let joined = fragments.join("\n\n");
        let mut last = 0;
        for i in 0..40 {
            let pos = joined
                .find(&format!("Paragraph number {}.", i))
                .unwrap_or_else(|| panic!("paragraph {} missing", i));
            assert!(pos >= last, "paragraph {} out of order", i);
            last = pos;
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha first paragraph.\n\nBeta second paragraph.\n\nGamma third.\n\nDelta fourth.";
        let a = split_text(text, 40, 10);
        let b = split_text(text, 40, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_sentences_boundaries() {
        let sentences = split_sentences("One two. Three four! Five six? Seven");
        assert_eq!(
            sentences,
            vec!["One two.", "Three four!", "Five six?", "Seven"]
        );
    }

    #[test]
    fn test_split_sentences_ignores_unspaced_dots() {
        // A period not followed by whitespace (e.g. a version number) does
        // not end a sentence.
        let sentences = split_sentences("Upgrade to 2.5 now. Then restart.");
        assert_eq!(sentences, vec!["Upgrade to 2.5 now.", "Then restart."]);
    }

    #[test]
    fn test_build_chunks_contiguous_indices() {
        let fragments = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let chunks = build_chunks("doc1", &fragments);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.document_id, "doc1");
            assert!(c.embedding_id.is_none());
        }
    }

    #[test]
    fn test_build_chunks_hash_deterministic() {
        let fragments = vec!["same text".to_string()];
        let a = build_chunks("doc1", &fragments);
        let b = build_chunks("doc2", &fragments);
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn test_tail_chars_multibyte_safe() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(tail_chars("abc", 0), "");
    }
}
