//! Consensus session state: the append-only round log and its terminal state.
//!
//! A [`ConsensusSession`] is owned by exactly one task, the one running the
//! rounds. Everybody else observes it through [`SessionSnapshot`]s, which share
//! the immutable round results behind `Arc`s and never alias the live log.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::controller::{FinalState, HumanReviewReason, RoundController, RoundDecision};
use crate::consensus::disagreement::{shared_statements, DisagreementSummary};
use crate::consensus::document::Category;
use crate::consensus::error::ConsensusError;
use crate::consensus::evaluator::RoundResult;
use std::sync::Arc;
use uuid::Uuid;

/// The multi-round run for one phase invocation.
///
/// # Examples
///
/// ```
/// use consensus_engine::{CategoryScores, ConsensusConfig, ConsensusSession, FinalState, RoundResult};
///
/// let config = ConsensusConfig::default();
/// let mut session = ConsensusSession::new("analyze", config.clone()).unwrap();
///
/// for (round, score) in [0.95, 0.97].iter().enumerate() {
///     let result = RoundResult::from_scores(round + 1, CategoryScores::uniform(*score), &config.weights, vec![]);
///     session.record_round(result).unwrap();
/// }
///
/// assert_eq!(session.final_state(), FinalState::ConsensusReached);
/// assert_eq!(session.rounds().len(), 2);
/// ```
#[derive(Debug)]
pub struct ConsensusSession {
    session_id: String,
    phase_id: String,
    controller: RoundController,
    rounds: Vec<Arc<RoundResult>>,
    final_state: FinalState,
    warnings: Vec<usize>,
    annotation: Option<String>,
}

impl ConsensusSession {
    /// Create an empty session after validating `config`.
    pub fn new(phase_id: impl Into<String>, config: ConsensusConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            phase_id: phase_id.into(),
            controller: RoundController::new(config),
            rounds: Vec::new(),
            final_state: FinalState::InProgress,
            warnings: Vec::new(),
            annotation: None,
        })
    }

    /// Rebuild a session from persisted rounds, replaying every transition.
    ///
    /// Replay stops early if the history already reached a terminal state;
    /// rounds after that point are ignored.
    pub fn restore(
        phase_id: impl Into<String>,
        config: ConsensusConfig,
        history: Vec<RoundResult>,
    ) -> Result<Self, ConsensusError> {
        let mut session = Self::new(phase_id, config)?;
        for result in history {
            if session.final_state.is_terminal() {
                log::warn!(
                    "Session '{}': ignoring persisted round {} after terminal state {}",
                    session.phase_id,
                    result.round,
                    session.final_state
                );
                break;
            }
            session.record_round(result)?;
        }
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase_id(&self) -> &str {
        &self.phase_id
    }

    pub fn config(&self) -> &ConsensusConfig {
        self.controller.config()
    }

    pub fn rounds(&self) -> &[Arc<RoundResult>] {
        &self.rounds
    }

    pub fn last_round(&self) -> Option<&Arc<RoundResult>> {
        self.rounds.last()
    }

    pub fn final_state(&self) -> FinalState {
        self.final_state
    }

    /// Rounds whose score fell below the warning threshold.
    pub fn warnings(&self) -> &[usize] {
        &self.warnings
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    /// Number of the round that would run next.
    pub fn next_round(&self) -> usize {
        self.rounds.len() + 1
    }

    pub fn is_finished(&self) -> bool {
        self.final_state.is_terminal()
    }

    /// Append a round result and apply the controller's transition.
    ///
    /// # Errors
    ///
    /// [`ConsensusError::ExecutionFailed`] if the session is already terminal and
    /// [`ConsensusError::Config`] if `result.round` is not the next round number.
    pub fn record_round(&mut self, result: RoundResult) -> Result<RoundDecision, ConsensusError> {
        if self.final_state.is_terminal() {
            return Err(ConsensusError::ExecutionFailed(format!(
                "session '{}' already finished as {}",
                self.phase_id, self.final_state
            )));
        }
        if result.round != self.next_round() {
            return Err(ConsensusError::Config(format!(
                "expected round {}, got round {}",
                self.next_round(),
                result.round
            )));
        }

        self.rounds.push(Arc::new(result));
        let scores: Vec<f64> = self.rounds.iter().map(|r| r.consensus_score).collect();
        let decision = self.controller.decide(&scores);

        if decision.warning {
            self.warnings.push(decision.round);
        }
        self.final_state = decision.state;
        Ok(decision)
    }

    /// End the session for human review. No-op on an already terminal session.
    pub fn require_human_review(&mut self, reason: HumanReviewReason, annotation: impl Into<String>) {
        if self.final_state.is_terminal() {
            return;
        }
        self.final_state = FinalState::HumanReviewRequired(reason);
        self.annotation = Some(annotation.into());
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            phase_id: self.phase_id.clone(),
            rounds: self.rounds.clone(),
            final_state: self.final_state,
            warnings: self.warnings.clone(),
        }
    }

    pub fn into_report(self) -> SessionReport {
        SessionReport {
            session_id: self.session_id,
            phase_id: self.phase_id,
            final_state: self.final_state,
            rounds: self.rounds,
            warnings: self.warnings,
            annotation: self.annotation,
        }
    }
}

/// Read-only copy of a session's progress, safe to hand to other tasks.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase_id: String,
    pub rounds: Vec<Arc<RoundResult>>,
    pub final_state: FinalState,
    pub warnings: Vec<usize>,
}

impl SessionSnapshot {
    pub fn latest_score(&self) -> Option<f64> {
        self.rounds.last().map(|r| r.consensus_score)
    }
}

/// Terminal outcome of a session, handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub phase_id: String,
    pub final_state: FinalState,
    pub rounds: Vec<Arc<RoundResult>>,
    /// Rounds whose score fell below the warning threshold.
    pub warnings: Vec<usize>,
    /// Human-readable detail for `HumanReviewRequired` outcomes.
    pub annotation: Option<String>,
}

impl SessionReport {
    pub fn total_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn final_score(&self) -> Option<f64> {
        self.rounds.last().map(|r| r.consensus_score)
    }

    pub fn reached_consensus(&self) -> bool {
        self.final_state == FinalState::ConsensusReached
    }

    /// Statements every agent of the final round agrees on, for downstream phases.
    pub fn agreed_statements(&self) -> Vec<(Category, String)> {
        self.rounds
            .last()
            .map(|r| shared_statements(&r.agent_documents))
            .unwrap_or_default()
    }

    /// Disagreement summary of the final round.
    pub fn final_disagreement(&self) -> Option<DisagreementSummary> {
        self.rounds.last().map(|r| DisagreementSummary::from_round(r))
    }
}
