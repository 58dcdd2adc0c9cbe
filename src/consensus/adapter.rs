//! The agent adapter boundary.
//!
//! Concrete LLM integrations live outside this crate. An [`AgentAdapter`]
//! receives the round prompt, built by [`RoundContext::compose_prompt`], plus
//! the [`RoundContext`] itself, and returns its raw analysis text. The engine
//! runs the configured extractor over that text to build the
//! [`AnalysisDocument`](crate::AnalysisDocument).
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use consensus_engine::{AgentAdapter, RoundContext};
//! use std::error::Error;
//!
//! struct EchoAdapter;
//!
//! #[async_trait]
//! impl AgentAdapter for EchoAdapter {
//!     fn id(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn analyze(
//!         &self,
//!         prompt: &str,
//!         context: &RoundContext,
//!     ) -> Result<String, Box<dyn Error + Send + Sync>> {
//!         Ok(format!("## Claims\n- {}\n(round {})", prompt, context.round))
//!     }
//! }
//! ```

use crate::consensus::disagreement::DisagreementSummary;
use crate::consensus::document::AnalysisDocument;
use crate::consensus::evaluator::RoundResult;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

/// Instruction appended to every prompt so agents answer in extractable sections.
pub const RESPONSE_FORMAT_INSTRUCTIONS: &str = "Structure your answer with exactly three \
Markdown sections: \"## Claims\", \"## Risks\" and \"## Recommendations\". Write one short, \
self-contained statement per bullet point.";

/// A producer of analysis text, typically backed by an LLM.
///
/// Adapters must be `Send + Sync`: every round calls all adapters concurrently
/// from separate tokio tasks. Retries and timeouts are applied by the engine
/// according to its [`ExecutionPolicy`](crate::ExecutionPolicy).
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Stable identifier, unique within a session.
    fn id(&self) -> &str;

    /// Produce this agent's analysis for the round described by `context`.
    ///
    /// `prompt` already carries the previous round's disagreement summary and
    /// the response format instructions.
    async fn analyze(
        &self,
        prompt: &str,
        context: &RoundContext,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// What an adapter knows about the session when it is called.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub phase_id: String,
    /// 1-based round being produced.
    pub round: usize,
    /// 1-based attempt for this agent within the round (retries increment it).
    pub attempt: usize,
    /// Result of the previous round, if any.
    pub previous: Option<Arc<RoundResult>>,
    /// Agreement/disagreement of the previous round, if any.
    pub disagreement: Option<DisagreementSummary>,
}

impl RoundContext {
    /// Context for the first round of a phase.
    pub fn first(phase_id: impl Into<String>) -> Self {
        Self {
            phase_id: phase_id.into(),
            round: 1,
            attempt: 1,
            previous: None,
            disagreement: None,
        }
    }

    /// Context for the round following `previous`.
    pub fn after(phase_id: impl Into<String>, previous: Arc<RoundResult>) -> Self {
        let disagreement = DisagreementSummary::from_round(&previous);
        Self {
            phase_id: phase_id.into(),
            round: previous.round + 1,
            attempt: 1,
            previous: Some(previous),
            disagreement: Some(disagreement),
        }
    }

    pub(crate) fn with_attempt(&self, attempt: usize) -> Self {
        let mut context = self.clone();
        context.attempt = attempt;
        context
    }

    /// This agent's own document from the previous round.
    pub fn own_previous(&self, agent_id: &str) -> Option<&AnalysisDocument> {
        self.previous
            .as_ref()
            .and_then(|p| p.agent_documents.iter().find(|d| d.agent_id == agent_id))
    }

    /// Full prompt for this round: the phase prompt, the previous round's
    /// disagreement summary (from round 2 on) and the response format.
    ///
    /// ```
    /// use consensus_engine::RoundContext;
    ///
    /// let prompt = RoundContext::first("analyze").compose_prompt("Review the cache design");
    /// assert!(prompt.starts_with("Review the cache design"));
    /// assert!(prompt.contains("## Risks"));
    /// ```
    pub fn compose_prompt(&self, prompt: &str) -> String {
        match &self.disagreement {
            None => format!("{}\n\n{}", prompt, RESPONSE_FORMAT_INSTRUCTIONS),
            Some(summary) => format!(
                "{}\n\n\
                 Round {} of consensus. The panel's previous round:\n\n{}\n\
                 Re-examine the contested statements. Keep statements you still hold, \
                 adopt wording the panel already agrees on where you concur, and drop \
                 statements you no longer stand behind.\n\n{}",
                prompt,
                self.round,
                summary.render(),
                RESPONSE_FORMAT_INSTRUCTIONS
            ),
        }
    }
}
