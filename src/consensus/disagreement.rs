//! Agreement and disagreement between agents within one round.
//!
//! The summary feeds the next round's prompt: agents see which statements the
//! whole panel already shares and which ones are still contested (and by whom).

use crate::consensus::document::{AnalysisDocument, Category};
use crate::consensus::evaluator::RoundResult;
use crate::consensus::similarity::normalize_statement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// A statement held by some, but not all, agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestedStatement {
    pub category: Category,
    /// First spelling seen, in canonical agent order.
    pub statement: String,
    pub supporters: Vec<String>,
}

/// Statements shared by every agent versus statements held by a subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisagreementSummary {
    pub round: usize,
    pub agent_count: usize,
    pub consensus_score: f64,
    pub agreed: Vec<(Category, String)>,
    pub contested: Vec<ContestedStatement>,
}

impl DisagreementSummary {
    /// Summarise the documents of `result`.
    ///
    /// Unstructured documents take part in the agent count, so nothing is
    /// agreed while one of them is present.
    ///
    /// ```
    /// use consensus_engine::{AnalysisDocument, ConsensusEvaluator, DisagreementSummary, MarkdownExtractor};
    ///
    /// let ex = MarkdownExtractor::default();
    /// let docs = vec![
    ///     AnalysisDocument::from_text("a1", 1, "Claims:\n- X\n- Y", &ex),
    ///     AnalysisDocument::from_text("a2", 1, "Claims:\n- x.\n- Z", &ex),
    /// ];
    /// let result = ConsensusEvaluator::default().evaluate(&docs).unwrap();
    /// let summary = DisagreementSummary::from_round(&result);
    /// assert_eq!(summary.agreed.len(), 1);
    /// assert_eq!(summary.contested.len(), 2);
    /// ```
    pub fn from_round(result: &RoundResult) -> Self {
        let documents = &result.agent_documents;
        let mut agreed = Vec::new();
        let mut contested = Vec::new();

        for category in Category::ALL.iter().copied() {
            // normalized statement -> (first spelling, supporters)
            let mut support: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
            for doc in documents {
                for statement in doc.statements(category) {
                    let key = normalize_statement(statement);
                    if key.is_empty() {
                        continue;
                    }
                    let entry = support
                        .entry(key)
                        .or_insert_with(|| (statement.clone(), Vec::new()));
                    if !entry.1.contains(&doc.agent_id) {
                        entry.1.push(doc.agent_id.clone());
                    }
                }
            }

            for (_, (statement, supporters)) in support {
                if supporters.len() == documents.len() {
                    agreed.push((category, statement));
                } else {
                    contested.push(ContestedStatement {
                        category,
                        statement,
                        supporters,
                    });
                }
            }
        }

        Self {
            round: result.round,
            agent_count: documents.len(),
            consensus_score: result.consensus_score,
            agreed,
            contested,
        }
    }

    /// Statements agreed by every agent in `category`.
    pub fn agreed_in(&self, category: Category) -> Vec<&str> {
        self.agreed
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, s)| s.as_str())
            .collect()
    }

    pub fn is_unanimous(&self) -> bool {
        self.contested.is_empty()
    }

    /// Render the summary as prompt text for the next round.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Round {} consensus score: {:.2} across {} agents.",
            self.round, self.consensus_score, self.agent_count
        );

        for category in Category::ALL.iter().copied() {
            let agreed = self.agreed_in(category);
            let contested: Vec<&ContestedStatement> = self
                .contested
                .iter()
                .filter(|c| c.category == category)
                .collect();
            if agreed.is_empty() && contested.is_empty() {
                continue;
            }

            let _ = writeln!(out, "\n{}:", capitalize(category.as_str()));
            for statement in agreed {
                let _ = writeln!(out, "- [agreed] {}", statement);
            }
            for item in contested {
                let _ = writeln!(
                    out,
                    "- [contested, held by {}] {}",
                    item.supporters.join(", "),
                    item.statement
                );
            }
        }

        out
    }
}

/// Statements that every document of a round shares, per category.
pub fn shared_statements(documents: &[AnalysisDocument]) -> Vec<(Category, String)> {
    if documents.is_empty() {
        return Vec::new();
    }
    let mut ordered: Vec<&AnalysisDocument> = documents.iter().collect();
    ordered.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let mut shared = Vec::new();
    for category in Category::ALL.iter().copied() {
        let first = ordered[0];
        let mut seen = std::collections::BTreeSet::new();
        for statement in first.statements(category) {
            let key = normalize_statement(statement);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            let everywhere = ordered[1..].iter().all(|doc| {
                doc.statements(category)
                    .iter()
                    .any(|s| normalize_statement(s) == key)
            });
            if everywhere {
                shared.push((category, statement.clone()));
            }
        }
    }
    shared
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::evaluator::ConsensusEvaluator;
    use crate::consensus::extractor::MarkdownExtractor;

    #[test]
    fn render_lists_contested_supporters() {
        let ex = MarkdownExtractor::new();
        let docs = vec![
            AnalysisDocument::from_text("alice", 1, "## Risks\n- outage\n- cost", &ex),
            AnalysisDocument::from_text("bob", 1, "## Risks\n- Outage!", &ex),
        ];
        let result = ConsensusEvaluator::default().evaluate(&docs).unwrap();
        let summary = DisagreementSummary::from_round(&result);

        assert_eq!(summary.agreed_in(Category::Risks), vec!["outage"]);
        assert!(!summary.is_unanimous());

        let text = summary.render();
        assert!(text.contains("Risks:"));
        assert!(text.contains("[agreed] outage"));
        assert!(text.contains("[contested, held by alice] cost"));
    }

    #[test]
    fn shared_statements_keep_first_spelling() {
        let ex = MarkdownExtractor::new();
        let docs = vec![
            AnalysisDocument::from_text("b", 2, "Claims:\n- Use Rust", &ex),
            AnalysisDocument::from_text("a", 2, "Claims:\n- use rust.\n- use Go", &ex),
        ];
        let shared = shared_statements(&docs);
        assert_eq!(shared, vec![(Category::Claims, "use rust.".to_string())]);
    }
}
