//! Round-level consensus evaluation.
//!
//! For every category the evaluator averages [`similarity`](crate::similarity::similarity)
//! over all unordered pairs of agents, then combines the three category scores
//! with [`CategoryWeights`] into a single consensus score in `[0, 1]`.
//!
//! ```text
//!            claims  risks  recs
//! (a1, a2)    1.00   0.50   1.00
//! (a1, a3)    0.50   0.50   0.00
//! (a2, a3)    0.50   1.00   0.00
//! ---------------------------------
//! mean        0.67   0.67   0.33   → 0.40*0.67 + 0.30*0.67 + 0.30*0.33 = 0.57
//! ```

use crate::consensus::config::CategoryWeights;
use crate::consensus::document::{AnalysisDocument, Category};
use crate::consensus::error::ConsensusError;
use crate::consensus::similarity::{set_similarity, statement_set};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Average pairwise similarity per category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub claims: f64,
    pub risks: f64,
    pub recommendations: f64,
}

impl CategoryScores {
    /// Every category scored identically.
    pub fn uniform(score: f64) -> Self {
        Self {
            claims: score,
            risks: score,
            recommendations: score,
        }
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Claims => self.claims,
            Category::Risks => self.risks,
            Category::Recommendations => self.recommendations,
        }
    }

    fn set(&mut self, category: Category, score: f64) {
        match category {
            Category::Claims => self.claims = score,
            Category::Risks => self.risks = score,
            Category::Recommendations => self.recommendations = score,
        }
    }

    /// `(category, score)` pairs in scoring order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |c| (*c, self.get(*c)))
    }

    /// Weighted sum, clamped to `[0, 1]`.
    pub fn weighted(&self, weights: &CategoryWeights) -> f64 {
        let score: f64 = self.iter().map(|(c, s)| weights.weight(c) * s).sum();
        score.max(0.0).min(1.0)
    }
}

/// The evaluation of one round.
///
/// A `RoundResult` owns copies of the documents it was computed from; they are
/// never modified after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based round number.
    pub round: usize,
    pub per_category_score: CategoryScores,
    pub consensus_score: f64,
    pub agent_documents: Vec<AnalysisDocument>,
    /// Agents dropped from this round after exhausting their retries.
    #[serde(default)]
    pub failed_agents: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl RoundResult {
    /// Build a result from precomputed category scores.
    ///
    /// Used when replaying persisted history or when scores come from an
    /// external evaluator.
    pub fn from_scores(
        round: usize,
        per_category_score: CategoryScores,
        weights: &CategoryWeights,
        agent_documents: Vec<AnalysisDocument>,
    ) -> Self {
        Self {
            round,
            consensus_score: per_category_score.weighted(weights),
            per_category_score,
            agent_documents,
            failed_agents: Vec::new(),
            evaluated_at: Utc::now(),
        }
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.agent_documents
            .iter()
            .map(|d| d.agent_id.as_str())
            .collect()
    }
}

/// Scores a round of [`AnalysisDocument`]s.
///
/// # Examples
///
/// ```
/// use consensus_engine::{AnalysisDocument, ConsensusEvaluator, Extraction};
///
/// let extraction = Extraction {
///     claims: vec!["X".into(), "Y".into()],
///     risks: vec!["Z".into()],
///     recommendations: vec!["W".into()],
///     structured: true,
/// };
/// let docs = vec![
///     AnalysisDocument::new("a1", 1, "", extraction.clone()),
///     AnalysisDocument::new("a2", 1, "", extraction),
/// ];
///
/// let result = ConsensusEvaluator::default().evaluate(&docs).unwrap();
/// assert_eq!(result.consensus_score, 1.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsensusEvaluator {
    weights: CategoryWeights,
}

impl ConsensusEvaluator {
    pub fn new(weights: CategoryWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &CategoryWeights {
        &self.weights
    }

    /// Evaluate one round.
    ///
    /// # Errors
    ///
    /// - [`ConsensusError::Config`] when documents carry different round numbers,
    ///   a round number of zero, or the weights are invalid.
    /// - [`ConsensusError::InsufficientAgents`] when `documents` is empty.
    ///
    /// A single document scores 1.0 in every category. The result does not
    /// depend on the order of `documents`.
    pub fn evaluate(&self, documents: &[AnalysisDocument]) -> Result<RoundResult, ConsensusError> {
        self.weights.validate()?;

        let round = match documents.first() {
            Some(doc) => doc.round,
            None => {
                return Err(ConsensusError::InsufficientAgents {
                    round: 0,
                    available: 0,
                })
            }
        };
        if round == 0 {
            return Err(ConsensusError::Config(
                "round numbers are 1-based".to_string(),
            ));
        }
        if let Some(other) = documents.iter().find(|d| d.round != round) {
            return Err(ConsensusError::Config(format!(
                "documents from different rounds passed to the evaluator ({} and {})",
                round, other.round
            )));
        }

        // Canonical order keeps floating-point summation identical for any permutation.
        let mut ordered: Vec<&AnalysisDocument> = documents.iter().collect();
        ordered.sort_by(|a, b| {
            a.agent_id
                .cmp(&b.agent_id)
                .then_with(|| a.raw_text.cmp(&b.raw_text))
                .then_with(|| a.structured.cmp(&b.structured))
                .then_with(|| a.claims.cmp(&b.claims))
                .then_with(|| a.risks.cmp(&b.risks))
                .then_with(|| a.recommendations.cmp(&b.recommendations))
        });

        let scores = if ordered.len() == 1 {
            CategoryScores::uniform(1.0)
        } else {
            let mut scores = CategoryScores::uniform(0.0);
            for category in Category::ALL.iter().copied() {
                scores.set(category, mean_pairwise(&ordered, category));
            }
            scores
        };

        let agent_documents = ordered.into_iter().cloned().collect();
        let result = RoundResult::from_scores(round, scores, &self.weights, agent_documents);

        log::debug!(
            "Round {} evaluated: claims={:.3} risks={:.3} recommendations={:.3} consensus={:.3}",
            round,
            scores.claims,
            scores.risks,
            scores.recommendations,
            result.consensus_score
        );

        Ok(result)
    }
}

/// Arithmetic mean of the similarity over all unordered pairs.
///
/// A document whose extractor found no category marker agrees with nothing.
fn mean_pairwise(documents: &[&AnalysisDocument], category: Category) -> f64 {
    let sets: Vec<Option<BTreeSet<String>>> = documents
        .iter()
        .map(|doc| {
            if doc.structured {
                Some(statement_set(doc.statements(category)))
            } else {
                None
            }
        })
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += match (&sets[i], &sets[j]) {
                (Some(a), Some(b)) => set_similarity(a, b),
                _ => 0.0,
            };
            pairs += 1;
        }
    }

    if pairs == 0 {
        1.0
    } else {
        total / pairs as f64
    }
}
