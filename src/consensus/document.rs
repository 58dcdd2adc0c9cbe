//! Analysis documents and their categorized statements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three statement categories every analysis is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Claims,
    Risks,
    Recommendations,
}

impl Category {
    /// Every category, in scoring order.
    pub const ALL: [Category; 3] = [Category::Claims, Category::Risks, Category::Recommendations];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Claims => "claims",
            Category::Risks => "risks",
            Category::Recommendations => "recommendations",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of an [`Extractor`](crate::consensus::extractor::Extractor).
///
/// `structured` records whether any category marker was recognized at all. An
/// unstructured extraction has three empty lists and agrees with nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub claims: Vec<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub structured: bool,
}

impl Extraction {
    pub fn statements(&self, category: Category) -> &[String] {
        match category {
            Category::Claims => &self.claims,
            Category::Risks => &self.risks,
            Category::Recommendations => &self.recommendations,
        }
    }

    pub(crate) fn statements_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Claims => &mut self.claims,
            Category::Risks => &mut self.risks,
            Category::Recommendations => &mut self.recommendations,
        }
    }
}

/// One agent's analysis for one round.
///
/// Documents are immutable once built; a [`RoundResult`](crate::RoundResult)
/// owns its own copies.
///
/// # Examples
///
/// ```
/// use consensus_engine::{AnalysisDocument, MarkdownExtractor};
///
/// let text = "## Claims\n- The cache is cold\n## Risks\n- Latency spikes";
/// let doc = AnalysisDocument::from_text("analyst", 1, text, &MarkdownExtractor::default());
/// assert_eq!(doc.claims, vec!["The cache is cold".to_string()]);
/// assert_eq!(doc.risks.len(), 1);
/// assert!(doc.recommendations.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub agent_id: String,
    /// 1-based round number.
    pub round: usize,
    /// Full adapter output, kept for audit only.
    pub raw_text: String,
    pub claims: Vec<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub structured: bool,
}

impl AnalysisDocument {
    /// Build a document from an extraction already computed for `raw_text`.
    pub fn new(
        agent_id: impl Into<String>,
        round: usize,
        raw_text: impl Into<String>,
        extraction: Extraction,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            round,
            raw_text: raw_text.into(),
            claims: extraction.claims,
            risks: extraction.risks,
            recommendations: extraction.recommendations,
            structured: extraction.structured,
        }
    }

    /// Run `extractor` over `raw_text` and build the document.
    pub fn from_text(
        agent_id: impl Into<String>,
        round: usize,
        raw_text: impl Into<String>,
        extractor: &dyn crate::consensus::extractor::Extractor,
    ) -> Self {
        let raw_text = raw_text.into();
        let extraction = extractor.extract(&raw_text);
        Self::new(agent_id, round, raw_text, extraction)
    }

    pub fn statements(&self, category: Category) -> &[String] {
        match category {
            Category::Claims => &self.claims,
            Category::Risks => &self.risks,
            Category::Recommendations => &self.recommendations,
        }
    }

    /// Total number of statements across all categories.
    pub fn statement_count(&self) -> usize {
        self.claims.len() + self.risks.len() + self.recommendations.len()
    }
}
