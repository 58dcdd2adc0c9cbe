//! Consensus session event system.
//!
//! Provides a callback-based observability layer for consensus sessions.
//! Implement [`EventHandler`] to receive real-time notifications about:
//!
//! - **Session lifecycle**: start and terminal state
//! - **Round boundaries**: round start and evaluation (scores per category)
//! - **Agent outcomes**: responses, retries and dropped agents
//! - **Warnings**: rounds whose score fell below the warning threshold
//!
//! # Event Flow (two agents, consensus in round 2)
//!
//! ```text
//! SessionStarted { agent_count: 2 }
//!   └─ RoundStarted { round: 1 }
//!       ├─ AgentResponded { agent: "a1" }
//!       └─ AgentResponded { agent: "a2" }
//!   └─ RoundEvaluated { round: 1, consensus_score: 0.62 }
//!   └─ RoundStarted { round: 2 }
//!       ├─ AgentRetrying { agent: "a2", attempt: 2 }
//!       ├─ AgentResponded { agent: "a1" }
//!       └─ AgentResponded { agent: "a2" }
//!   └─ RoundEvaluated { round: 2, consensus_score: 0.93 }
//! SessionFinished { final_state: ConsensusReached, total_rounds: 2 }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use consensus_engine::event::{ConsensusEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_consensus_event(&self, event: &ConsensusEvent) {
//!         if let ConsensusEvent::ConsensusWarning { phase_id, round, consensus_score } = event {
//!             eprintln!("[{}] round {} scored only {:.2}", phase_id, round, consensus_score);
//!         }
//!     }
//! }
//! ```

use crate::consensus::controller::FinalState;
use crate::consensus::evaluator::CategoryScores;
use async_trait::async_trait;

/// Events emitted by a consensus session.
///
/// Every variant carries the `phase_id` of the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusEvent {
    /// A session started (or resumed) and is about to run its first round.
    SessionStarted {
        phase_id: String,
        session_id: String,
        agent_count: usize,
        /// Round that will run first; greater than 1 for resumed sessions.
        first_round: usize,
    },

    /// A round is starting; all adapters are about to be called.
    RoundStarted { phase_id: String, round: usize },

    /// An agent returned an analysis for the round.
    AgentResponded {
        phase_id: String,
        round: usize,
        agent_id: String,
        /// Number of statements the extractor found.
        statement_count: usize,
        /// `false` when no category marker was recognized.
        structured: bool,
    },

    /// An agent call failed and will be attempted again.
    AgentRetrying {
        phase_id: String,
        round: usize,
        agent_id: String,
        /// 1-based attempt about to run.
        attempt: usize,
        error: String,
    },

    /// An agent exhausted its retries (or the round deadline passed) and was
    /// dropped from this round.
    AgentFailed {
        phase_id: String,
        round: usize,
        agent_id: String,
        error: String,
    },

    /// A round was scored.
    RoundEvaluated {
        phase_id: String,
        round: usize,
        consensus_score: f64,
        per_category_score: CategoryScores,
    },

    /// The round's score fell below the warning threshold. Emitted regardless
    /// of whether the session continues.
    ConsensusWarning {
        phase_id: String,
        round: usize,
        consensus_score: f64,
    },

    /// The session reached a terminal state.
    SessionFinished {
        phase_id: String,
        final_state: FinalState,
        total_rounds: usize,
    },
}

impl ConsensusEvent {
    pub fn phase_id(&self) -> &str {
        match self {
            ConsensusEvent::SessionStarted { phase_id, .. }
            | ConsensusEvent::RoundStarted { phase_id, .. }
            | ConsensusEvent::AgentResponded { phase_id, .. }
            | ConsensusEvent::AgentRetrying { phase_id, .. }
            | ConsensusEvent::AgentFailed { phase_id, .. }
            | ConsensusEvent::RoundEvaluated { phase_id, .. }
            | ConsensusEvent::ConsensusWarning { phase_id, .. }
            | ConsensusEvent::SessionFinished { phase_id, .. } => phase_id,
        }
    }
}

/// Trait for receiving consensus events.
///
/// The default implementation is a no-op, so handlers only override what they
/// need. The `Send + Sync` bound allows the handler to be shared across
/// sessions via `Arc<dyn EventHandler>`; use appropriate synchronization for
/// any internal state.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_consensus_event(&self, _event: &ConsensusEvent) {}
}

/// Handler that forwards every event to the `log` facade.
#[derive(Debug, Default, Clone)]
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn on_consensus_event(&self, event: &ConsensusEvent) {
        match event {
            ConsensusEvent::ConsensusWarning { .. } | ConsensusEvent::AgentFailed { .. } => {
                log::warn!("{:?}", event)
            }
            _ => log::info!("{:?}", event),
        }
    }
}
