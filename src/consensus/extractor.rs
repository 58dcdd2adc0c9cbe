//! Categorized extraction of claims, risks and recommendations.
//!
//! An [`Extractor`] turns an agent's free-form answer into an [`Extraction`].
//! Extraction never fails: text without any recognizable category marker yields
//! an unstructured, empty extraction. Two strategies are provided:
//!
//! - [`MarkdownExtractor`]: section headings (`## Risks`, `**Risks**`,
//!   `Risks:`) followed by bullet or numbered lines.
//! - [`JsonExtractor`]: a JSON object with `claims`, `risks` and
//!   `recommendations` arrays, optionally wrapped in a fenced code block.
//!
//! Implement [`Extractor`] to support any other output format; the evaluator
//! only ever sees the resulting statement lists.

use crate::consensus::document::{Category, Extraction};
use serde_json::Value;

/// Strategy that splits raw agent output into categorized statements.
///
/// Implementations must be deterministic: the same text always yields the same
/// extraction, so round scores are reproducible.
///
/// ```rust
/// use consensus_engine::{Extraction, Extractor};
///
/// /// Treats every line as a claim.
/// struct LinesAsClaims;
///
/// impl Extractor for LinesAsClaims {
///     fn extract(&self, raw_text: &str) -> Extraction {
///         let claims: Vec<String> = raw_text
///             .lines()
///             .map(str::trim)
///             .filter(|l| !l.is_empty())
///             .map(String::from)
///             .collect();
///         Extraction { structured: !claims.is_empty(), claims, ..Default::default() }
///     }
/// }
///
/// assert_eq!(LinesAsClaims.extract("a\n\nb").claims.len(), 2);
/// ```
pub trait Extractor: Send + Sync {
    fn extract(&self, raw_text: &str) -> Extraction;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

const CLAIM_LABELS: &[&str] = &[
    "claims",
    "claim",
    "findings",
    "finding",
    "assertions",
    "assertion",
    "observations",
];

const RISK_LABELS: &[&str] = &["risks", "risk", "concerns", "concern", "threats", "threat"];

const RECOMMENDATION_LABELS: &[&str] = &[
    "recommendations",
    "recommendation",
    "suggestions",
    "suggestion",
    "actions",
    "next steps",
    "recommended actions",
];

const LABEL_QUALIFIERS: &[&str] = &["key ", "main ", "top ", "primary ", "identified "];

/// Map a heading label onto a category, ignoring case, punctuation and a few
/// qualifiers such as "Key" or "Top".
fn category_for_label(label: &str) -> Option<Category> {
    let mut normalized = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for qualifier in LABEL_QUALIFIERS {
        if let Some(stripped) = normalized.strip_prefix(qualifier) {
            normalized = stripped.to_string();
        }
    }

    let label = normalized.as_str();
    if CLAIM_LABELS.contains(&label) {
        Some(Category::Claims)
    } else if RISK_LABELS.contains(&label) {
        Some(Category::Risks)
    } else if RECOMMENDATION_LABELS.contains(&label) {
        Some(Category::Recommendations)
    } else {
        None
    }
}

enum Line {
    /// A section heading. `category` is `None` for headings of unrelated sections.
    Heading {
        category: Option<Category>,
        inline: Option<String>,
    },
    Text(String),
    Skip,
}

/// Extracts statements from Markdown-like section headings and bullet lists.
///
/// Recognized heading forms: `# Claims`, `### Key Risks`, `**Recommendations**`,
/// `**Risks:**` and `Claims:`. Text after the colon of an inline heading
/// (`Risks: vendor lock-in`) becomes the first statement of that section. Any
/// other `#` or bold heading closes the current section. Lines inside a section
/// become statements after their bullet marker (`-`, `*`, `+`, `•`, `1.`, `1)`)
/// is removed.
///
/// ```
/// use consensus_engine::{Extractor, MarkdownExtractor};
///
/// let text = "\
/// **Claims**
/// 1. Throughput is bounded by the DB
/// 2) Reads dominate
///
/// Risks: schema drift
/// ## Notes
/// - not a statement";
///
/// let extraction = MarkdownExtractor::default().extract(text);
/// assert_eq!(extraction.claims, vec!["Throughput is bounded by the DB", "Reads dominate"]);
/// assert_eq!(extraction.risks, vec!["schema drift"]);
/// assert!(extraction.recommendations.is_empty());
/// assert!(extraction.structured);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MarkdownExtractor;

impl MarkdownExtractor {
    pub fn new() -> Self {
        Self
    }

    fn classify(line: &str) -> Line {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("```")
            || trimmed.chars().all(|c| c == '-' || c == '=' || c == '*' || c == '_')
        {
            return Line::Skip;
        }

        if trimmed.starts_with('#') {
            let text = strip_emphasis(trimmed.trim_start_matches('#').trim());
            let (label, inline) = split_label(&text);
            return Line::Heading {
                category: category_for_label(label),
                inline,
            };
        }

        for marker in &["**", "__"] {
            if let Some(rest) = trimmed.strip_prefix(marker) {
                if let Some(end) = rest.find(marker) {
                    let inner = &rest[..end];
                    let after = rest[end + marker.len()..].trim();
                    let (label, inner_inline) = split_label(inner);
                    let after_inline = after.trim_start_matches(':').trim();
                    let inline = inner_inline.or_else(|| {
                        if after_inline.is_empty() {
                            None
                        } else {
                            Some(after_inline.to_string())
                        }
                    });
                    match category_for_label(label) {
                        Some(category) => {
                            return Line::Heading {
                                category: Some(category),
                                inline,
                            }
                        }
                        None if after.is_empty() => {
                            return Line::Heading {
                                category: None,
                                inline: None,
                            }
                        }
                        None => {}
                    }
                }
            }
        }

        let is_bullet = strip_bullet(trimmed).len() != trimmed.len();
        if let (false, Some(idx)) = (is_bullet, trimmed.find(':')) {
            if let Some(category) = category_for_label(&trimmed[..idx]) {
                let rest = trimmed[idx + 1..].trim();
                return Line::Heading {
                    category: Some(category),
                    inline: if rest.is_empty() {
                        None
                    } else {
                        Some(rest.to_string())
                    },
                };
            }
        }

        Line::Text(strip_bullet(trimmed).to_string())
    }
}

impl Extractor for MarkdownExtractor {
    fn extract(&self, raw_text: &str) -> Extraction {
        let mut extraction = Extraction::default();
        let mut current: Option<Category> = None;

        for line in raw_text.lines() {
            match Self::classify(line) {
                Line::Skip => {}
                Line::Heading { category, inline } => {
                    current = category;
                    if let Some(category) = category {
                        extraction.structured = true;
                        if let Some(text) = inline {
                            push_statement(&mut extraction, category, &text);
                        }
                    }
                }
                Line::Text(text) => {
                    if let Some(category) = current {
                        push_statement(&mut extraction, category, &text);
                    }
                }
            }
        }

        extraction
    }

    fn name(&self) -> &str {
        "markdown"
    }
}

fn push_statement(extraction: &mut Extraction, category: Category, text: &str) {
    let statement = strip_emphasis(text.trim());
    let statement = statement.trim();
    if !statement.is_empty() {
        extraction
            .statements_mut(category)
            .push(statement.to_string());
    }
}

/// Split `Label: inline text` into its label and optional inline statement.
fn split_label(text: &str) -> (&str, Option<String>) {
    match text.find(':') {
        Some(idx) => {
            let rest = text[idx + 1..].trim();
            let inline = if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            };
            (&text[..idx], inline)
        }
        None => (text, None),
    }
}

fn strip_emphasis(text: &str) -> String {
    let mut out = text.trim();
    for marker in &["**", "__"] {
        if out.len() >= 2 * marker.len() && out.starts_with(marker) && out.ends_with(marker) {
            out = &out[marker.len()..out.len() - marker.len()];
        }
    }
    out.trim().to_string()
}

fn strip_bullet(line: &str) -> &str {
    for marker in &["- ", "* ", "+ ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }

    line
}

/// Extracts statements from a JSON object.
///
/// The object may appear anywhere in the text (for example inside a fenced
/// `json` block); the first `{` and the last `}` delimit it. Keys are matched
/// with the same synonyms as the Markdown headings, so `"concerns"` maps to
/// risks. Each value may be an array of strings or a single string. Text that
/// does not parse, or an object without any known key, is unstructured.
///
/// ```
/// use consensus_engine::{Extractor, JsonExtractor};
///
/// let text = r#"Analysis: {"claims": ["X", "Y"], "concerns": "Z", "recommendations": []}"#;
/// let extraction = JsonExtractor::default().extract(text);
/// assert_eq!(extraction.claims, vec!["X", "Y"]);
/// assert_eq!(extraction.risks, vec!["Z"]);
/// assert!(extraction.structured);
///
/// assert!(!JsonExtractor::default().extract("no json here").structured);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for JsonExtractor {
    fn extract(&self, raw_text: &str) -> Extraction {
        let mut extraction = Extraction::default();

        let (start, end) = match (raw_text.find('{'), raw_text.rfind('}')) {
            (Some(start), Some(end)) if start < end => (start, end),
            _ => return extraction,
        };

        let object = match serde_json::from_str::<Value>(&raw_text[start..=end]) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return extraction,
            Err(e) => {
                log::debug!("JsonExtractor: unparseable analysis object: {}", e);
                return extraction;
            }
        };

        for (key, value) in &object {
            let category = match category_for_label(key) {
                Some(category) => category,
                None => continue,
            };
            extraction.structured = true;
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Value::String(text) = item {
                            push_statement(&mut extraction, category, text);
                        }
                    }
                }
                Value::String(text) => push_statement(&mut extraction, category, text),
                _ => {}
            }
        }

        extraction
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_markers_is_unstructured() {
        let extraction = MarkdownExtractor::new().extract("I think the design is fine overall.");
        assert!(!extraction.structured);
        assert!(extraction.claims.is_empty());
        assert!(extraction.risks.is_empty());
        assert!(extraction.recommendations.is_empty());
    }

    #[test]
    fn preserves_duplicates_and_order() {
        let text = "## Claims\n- B\n- A\n- B\n";
        let extraction = MarkdownExtractor::new().extract(text);
        assert_eq!(extraction.claims, vec!["B", "A", "B"]);
    }

    #[test]
    fn unrelated_heading_closes_section() {
        let text = "# Findings\n- one\n# Summary\n- ignored\n### Next Steps\n- ship it";
        let extraction = MarkdownExtractor::new().extract(text);
        assert_eq!(extraction.claims, vec!["one"]);
        assert_eq!(extraction.recommendations, vec!["ship it"]);
    }

    #[test]
    fn qualifiers_and_bold_labels() {
        let text = "**Key Risks:**\n* outage during migration\n__Suggestions__\n+ add canary";
        let extraction = MarkdownExtractor::new().extract(text);
        assert_eq!(extraction.risks, vec!["outage during migration"]);
        assert_eq!(extraction.recommendations, vec!["add canary"]);
    }

    #[test]
    fn bold_statement_is_not_a_heading() {
        let text = "## Claims\n**Important** the cache is cold";
        let extraction = MarkdownExtractor::new().extract(text);
        assert_eq!(extraction.claims, vec!["**Important** the cache is cold"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Claims: a\n- b\nRisks:\n- c\n";
        let first = MarkdownExtractor::new().extract(text);
        let second = MarkdownExtractor::new().extract(text);
        assert_eq!(first, second);
        assert_eq!(first.claims, vec!["a", "b"]);
        assert_eq!(first.risks, vec!["c"]);
    }

    #[test]
    fn json_ignores_unknown_keys_and_non_strings() {
        let text = r#"{"summary": "x", "risks": ["a", 3, "b"]}"#;
        let extraction = JsonExtractor::new().extract(text);
        assert!(extraction.structured);
        assert_eq!(extraction.risks, vec!["a", "b"]);
        assert!(extraction.claims.is_empty());
    }

    #[test]
    fn bullet_with_label_stays_in_section() {
        let text = "## Claims\n- Risk: low\n";
        let extraction = MarkdownExtractor::new().extract(text);
        assert_eq!(extraction.claims, vec!["Risk: low"]);
        assert!(extraction.risks.is_empty());
    }

    #[test]
    fn json_inside_fenced_block() {
        let text = "```json\n{\"recommendations\": [\"ship\"]}\n```";
        let extraction = JsonExtractor::new().extract(text);
        assert_eq!(extraction.recommendations, vec!["ship"]);
    }

    #[test]
    fn json_without_known_keys_is_unstructured() {
        let extraction = JsonExtractor::new().extract(r#"{"summary": "x"}"#);
        assert!(!extraction.structured);
    }
}
