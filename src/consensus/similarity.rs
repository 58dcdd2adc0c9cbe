//! Statement normalisation and set similarity.
//!
//! Statements are compared as whole normalised strings, not word by word: two
//! agents agree on a statement only when they phrase the same assertion after
//! case folding and punctuation removal.

use std::collections::BTreeSet;

/// Case-fold a statement, drop punctuation and collapse whitespace.
///
/// ```
/// use consensus_engine::similarity::normalize_statement;
///
/// assert_eq!(normalize_statement("  The API is *stable*!  "), "the api is stable");
/// assert_eq!(normalize_statement("..."), "");
/// ```
pub fn normalize_statement(statement: &str) -> String {
    statement
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The set of normalised statements; statements that normalise to nothing are dropped.
pub fn statement_set<S: AsRef<str>>(statements: &[S]) -> BTreeSet<String> {
    statements
        .iter()
        .map(|s| normalize_statement(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` over normalised statements.
///
/// Two empty sets agree vacuously (1.0); exactly one empty set scores 0.0.
///
/// ```
/// use consensus_engine::similarity::similarity;
///
/// let a = vec!["X", "Y"];
/// let b = vec!["y.", "Z"];
/// assert!((similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
/// assert_eq!(similarity::<&str>(&[], &[]), 1.0);
/// assert_eq!(similarity(&a, &[]), 0.0);
/// ```
pub fn similarity<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    set_similarity(&statement_set(a), &statement_set(b))
}

/// Jaccard similarity over already-normalised sets.
pub fn set_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.union(b).count();

    intersection as f64 / union as f64
}
