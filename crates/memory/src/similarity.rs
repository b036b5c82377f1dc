//! Lexical similarity for the knowledge base.
//!
//! Pure-Rust, no embedding service:
//! - tokenization with stopword removal and plural folding
//! - IDF-weighted query coverage (what share of the query a passage answers)
//! - cosine similarity over sparse term-frequency vectors
//!
//! The final score blends the two and stays in `[0, 1]`.

use std::collections::{HashMap, HashSet};

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but",
    "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of",
    "on", "or", "our", "she", "should", "so", "some", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "too", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

const COVERAGE_WEIGHT: f32 = 0.8;

/// Fold simple English plurals so "batteries" matches "battery".
fn fold(token: &str) -> String {
    if let Some(stem) = token.strip_suffix("ies") {
        if stem.len() >= 2 {
            return format!("{stem}y");
        }
    }
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Lowercased content terms of `text`, in order, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 2 || t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .map(|t| fold(&t))
        .collect()
}

/// Sparse term-frequency vector.
pub fn term_vector(tokens: &[String]) -> HashMap<String, f32> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of two sparse vectors. 0.0 if either is empty.
pub fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| (*x as f64) * (*y as f64)))
        .sum();
    let norm_a: f64 = a.values().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|y| (*y as f64).powi(2)).sum::<f64>().sqrt();

    let denom = norm_a * norm_b;
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Inverse document frequency over a corpus of term vectors.
pub fn idf(term: &str, corpus: &[&HashMap<String, f32>]) -> f32 {
    let df = corpus.iter().filter(|doc| doc.contains_key(term)).count() as f32;
    (1.0 + corpus.len() as f32 / (1.0 + df)).ln()
}

/// Score a passage against a query, in `[0, 1]`.
pub fn score(
    query: &HashMap<String, f32>,
    passage: &HashMap<String, f32>,
    corpus: &[&HashMap<String, f32>],
) -> f32 {
    let terms: HashSet<&String> = query.keys().collect();
    if terms.is_empty() {
        return 0.0;
    }

    let mut total = 0.0f32;
    let mut covered = 0.0f32;
    for term in terms {
        let weight = idf(term, corpus);
        total += weight;
        if passage.contains_key(term) {
            covered += weight;
        }
    }
    let coverage = if total > 0.0 { covered / total } else { 0.0 };

    let blended =
        COVERAGE_WEIGHT * coverage + (1.0 - COVERAGE_WEIGHT) * cosine_similarity(query, passage);
    blended.clamp(0.0, 1.0)
}

/// Split a document into chunks of at most `max_chars`, at paragraph
/// boundaries where possible.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.len() + 2 + paragraph.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if paragraph.len() > max_chars {
            // Oversized paragraph: hard-split on char boundaries.
            let mut piece = String::new();
            for ch in paragraph.chars() {
                if piece.len() + ch.len_utf8() > max_chars {
                    chunks.push(std::mem::take(&mut piece));
                }
                piece.push(ch);
            }
            current = piece;
            continue;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(text: &str) -> HashMap<String, f32> {
        term_vector(&tokenize(text))
    }

    #[test]
    fn tokenize_drops_stopwords_and_folds_plurals() {
        assert_eq!(tokenize("What is my battery level?"), vec!["battery", "level"]);
        assert_eq!(tokenize("Batteries and inverters"), vec!["battery", "inverter"]);
        assert_eq!(tokenize("Keep cells at 80 %"), vec!["keep", "cell", "80"]);
    }

    #[test]
    fn cosine_identical_is_one() {
        let a = vec_of("solar inverter");
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_disjoint_is_zero() {
        assert_eq!(cosine_similarity(&vec_of("solar"), &vec_of("mining")), 0.0);
        assert_eq!(cosine_similarity(&vec_of(""), &vec_of("mining")), 0.0);
    }

    #[test]
    fn full_coverage_scores_high() {
        let passage = vec_of("LiFePO4 battery chemistry tolerates deep discharge well");
        let other = vec_of("Bitcoin miners draw constant power");
        let corpus = [&passage, &other];
        let s = score(&vec_of("lifepo4 discharge"), &passage, &corpus);
        assert!(s > 0.8, "score was {s}");
    }

    #[test]
    fn unrelated_passage_scores_zero() {
        let passage = vec_of("Bitcoin miners draw constant power");
        let corpus = [&passage];
        assert_eq!(score(&vec_of("battery level"), &passage, &corpus), 0.0);
    }

    #[test]
    fn partial_coverage_is_between() {
        let passage = vec_of("battery warranty terms");
        let corpus = [&passage];
        let s = score(&vec_of("battery temperature"), &passage, &corpus);
        assert!(s > 0.2 && s < 0.8, "score was {s}");
    }

    #[test]
    fn chunking_respects_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 40);
        assert_eq!(chunks, vec!["First paragraph.\n\nSecond paragraph.", "Third paragraph."]);
    }

    #[test]
    fn chunking_splits_oversized_paragraphs() {
        let text = "x".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }
}
