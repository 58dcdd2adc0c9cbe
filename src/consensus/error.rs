//! Error taxonomy for the consensus engine.
//!
//! Configuration problems are surfaced immediately and never retried. Adapter
//! failures are recovered inside the round (retry, then drop the agent) and do
//! not escape the engine; the remaining variants describe terminal outcomes.

use std::error::Error;
use std::fmt;

/// Errors produced while configuring or running a consensus session.
///
/// # Examples
///
/// ```
/// use consensus_engine::ConsensusError;
///
/// let err = ConsensusError::Config("min_rounds must be at least 1".into());
/// assert_eq!(err.to_string(), "Invalid configuration: min_rounds must be at least 1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// The session configuration or evaluator input is malformed (weights not
    /// summing to 1, `min_rounds > max_rounds`, documents from different rounds).
    Config(String),

    /// A single agent's call failed or timed out.
    Adapter {
        /// Agent whose call failed.
        agent_id: String,
        /// Error text reported by the adapter or the timeout.
        message: String,
    },

    /// Fewer contributing documents than pairwise comparison needs.
    InsufficientAgents {
        /// Round that could not be scored.
        round: usize,
        /// Number of documents that were available.
        available: usize,
    },

    /// Cancellation was observed at a checkpoint.
    Cancelled {
        /// Round that would have started (or was retrying) when cancellation was seen.
        round: usize,
    },

    /// The round store rejected a round.
    Persistence(String),

    /// A runtime failure outside any single adapter (e.g. a task join error).
    ExecutionFailed(String),
}

impl ConsensusError {
    /// Whether this error ends the session without being retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConsensusError::Adapter { .. })
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            ConsensusError::Adapter { agent_id, message } => {
                write!(f, "Agent '{}' failed: {}", agent_id, message)
            }
            ConsensusError::InsufficientAgents { round, available } => write!(
                f,
                "Round {} has {} contributing agent(s); at least 2 are required",
                round, available
            ),
            ConsensusError::Cancelled { round } => {
                write!(f, "Session cancelled before round {}", round)
            }
            ConsensusError::Persistence(msg) => write!(f, "Failed to persist round: {}", msg),
            ConsensusError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
        }
    }
}

impl Error for ConsensusError {}
