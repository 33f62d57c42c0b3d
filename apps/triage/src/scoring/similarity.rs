//! Term-overlap similarity between a job description and a skill list.
//!
//! Bag-of-words term-frequency vectors compared by cosine similarity.
//! Deterministic and allocation-light; no corpus statistics are needed, so a
//! job scores the same regardless of which other jobs share its batch.

use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "our", "that", "the", "this", "to", "we", "will", "with",
    "you", "your",
];

/// Lowercased tokens with stop words removed.
///
/// Splits on anything that isn't alphanumeric, except `+`, `#` and `.` inside a
/// token, so `c++`, `c#` and `node.js` survive as single terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of the two texts' term-frequency vectors, in [0, 1].
/// Returns 0.0 when either side has no terms.
pub fn cosine_similarity(left: &str, right: &str) -> f64 {
    let left_tokens = tokenize(left);
    let right_tokens = tokenize(right);
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0.0;
    }

    let left_tf = term_frequencies(&left_tokens);
    let right_tf = term_frequencies(&right_tokens);

    let dot: f64 = left_tf
        .iter()
        .filter_map(|(term, l)| right_tf.get(term).map(|r| l * r))
        .sum();
    let left_norm = left_tf.values().map(|v| v * v).sum::<f64>().sqrt();
    let right_norm = right_tf.values().map(|v| v * v).sum::<f64>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    (dot / (left_norm * right_norm)).clamp(0.0, 1.0)
}
