//! # Consensus Engine
//!
//! A multi-agent consensus engine for analysis phases. Several independent
//! agents analyse the same prompt; each reply is broken into **claims**,
//! **risks** and **recommendations**, and the panel keeps revising over rounds
//! until their statements agree closely enough, the round budget runs out, or
//! the session stalls and is escalated to a human.
//!
//! The crate provides layered abstractions for:
//!
//! * **Extraction**: [`Extractor`] turns free-form agent text into an
//!   [`AnalysisDocument`]; [`MarkdownExtractor`] and [`JsonExtractor`] ship in the box
//! * **Scoring**: [`ConsensusEvaluator`] averages pairwise Jaccard similarity per
//!   category and weights the categories (0.40 / 0.30 / 0.30 by default)
//! * **Escalation**: [`RoundController`] decides after every round whether the
//!   session continues, reached consensus, ran out of rounds or needs human review
//! * **Execution**: [`ConsensusEngine`] calls every [`AgentAdapter`] of a round
//!   concurrently with timeouts and retries, and feeds each round's
//!   [`DisagreementSummary`] into the next prompt
//! * **Persistence**: [`RoundStore`] implementations record every round so a
//!   session can be resumed
//!
//! ## Scoring by hand
//!
//! ```rust
//! use consensus_engine::{AnalysisDocument, ConsensusEvaluator, MarkdownExtractor};
//!
//! let extractor = MarkdownExtractor::new();
//! let docs = vec![
//!     AnalysisDocument::from_text("a1", 1, "## Claims\n- X\n- Y\n## Risks\n- Z\n## Recommendations\n- W", &extractor),
//!     AnalysisDocument::from_text("a2", 1, "## Claims\n- X\n## Risks\n- Z\n## Recommendations\n- W", &extractor),
//! ];
//!
//! let result = ConsensusEvaluator::default().evaluate(&docs).unwrap();
//! // claims 1/2, risks 1, recommendations 1
//! assert!((result.consensus_score - 0.8).abs() < 1e-9);
//! ```
//!
//! ## Running a session
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use consensus_engine::{AgentAdapter, ConsensusConfig, ConsensusEngine, RoundContext};
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! struct Reviewer(&'static str);
//!
//! #[async_trait]
//! impl AgentAdapter for Reviewer {
//!     fn id(&self) -> &str {
//!         self.0
//!     }
//!     async fn analyze(&self, prompt: &str, _: &RoundContext) -> Result<String, Box<dyn Error + Send + Sync>> {
//!         // Call an LLM with `prompt` here.
//!         Ok(format!("## Claims\n- {}", prompt.lines().next().unwrap_or_default()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
//!     consensus_engine::init_logger();
//!
//!     let mut engine = ConsensusEngine::new(ConsensusConfig::default().with_threshold(0.85));
//!     engine.add_adapter(Arc::new(Reviewer("architect")))?;
//!     engine.add_adapter(Arc::new(Reviewer("security")))?;
//!
//!     let handle = engine.start_session("analyze", "Assess the migration plan")?;
//!     let report = handle.wait().await?;
//!     println!("{} (score {:?})", report.final_state, report.final_score());
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding the engine can opt in to `RUST_LOG` driven
/// diagnostics (round scores, dropped agents, warnings) without choosing a
/// logging backend upfront.
///
/// ```rust
/// consensus_engine::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `consensus` module.
pub mod consensus;

// Re-exporting key items for easier external access.
pub use consensus::adapter::{AgentAdapter, RoundContext, RESPONSE_FORMAT_INSTRUCTIONS};
pub use consensus::config::{CategoryWeights, ConsensusConfig, ExecutionPolicy};
pub use consensus::controller::{FinalState, HumanReviewReason, RoundController, RoundDecision};
pub use consensus::disagreement::{shared_statements, ContestedStatement, DisagreementSummary};
pub use consensus::document::{AnalysisDocument, Category, Extraction};
pub use consensus::engine::{start_session, ConsensusEngine, SessionHandle};
pub use consensus::error::ConsensusError;
pub use consensus::evaluator::{CategoryScores, ConsensusEvaluator, RoundResult};
pub use consensus::extractor::{Extractor, JsonExtractor, MarkdownExtractor};
pub use consensus::session::{ConsensusSession, SessionReport, SessionSnapshot};
pub use consensus::store::{
    round_log_filename, InMemoryRoundStore, JsonlRoundStore, NoopRoundStore, RoundStore,
};

pub use consensus::event;
pub use consensus::event::{ConsensusEvent, EventHandler, LogEventHandler};
pub use consensus::similarity;
