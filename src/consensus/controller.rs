//! Round-escalation state machine.
//!
//! ```text
//!                 ┌──────────────┐
//!        ┌───────►│  InProgress  │──── score >= threshold (r >= min_rounds) ──► ConsensusReached
//!        │        └──────┬───────┘──── r >= max_rounds ──────────────────────► MaxRoundsExhausted
//!  next round            │      ────── |Δscore| < stagnation (r > min_rounds) ► HumanReviewRequired(stagnation)
//!        └───────────────┘      ────── < 2 agents / cancel ──────────────────► HumanReviewRequired(..)
//! ```
//!
//! The controller is a pure function of the configuration and the score
//! history, which keeps every transition reproducible in tests.

use crate::consensus::config::ConsensusConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session ended in [`FinalState::HumanReviewRequired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanReviewReason {
    /// Scores stopped improving below the threshold.
    Stagnation,
    /// Fewer than two documents were left to compare.
    InsufficientAgents,
    /// The session was cancelled at a checkpoint.
    Cancelled,
}

impl HumanReviewReason {
    /// Stable reason code reported to users.
    pub fn code(&self) -> &'static str {
        match self {
            HumanReviewReason::Stagnation => "stagnation",
            HumanReviewReason::InsufficientAgents => "insufficient_agents",
            HumanReviewReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for HumanReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lifecycle state of a consensus session. Every state but `InProgress` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    InProgress,
    ConsensusReached,
    MaxRoundsExhausted,
    HumanReviewRequired(HumanReviewReason),
}

impl FinalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FinalState::InProgress)
    }

    pub fn review_reason(&self) -> Option<HumanReviewReason> {
        match self {
            FinalState::HumanReviewRequired(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalState::InProgress => f.write_str("in_progress"),
            FinalState::ConsensusReached => f.write_str("consensus_reached"),
            FinalState::MaxRoundsExhausted => f.write_str("max_rounds_exhausted"),
            FinalState::HumanReviewRequired(reason) => {
                write!(f, "human_review_required ({})", reason)
            }
        }
    }
}

/// Outcome of evaluating the latest round against the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundDecision {
    pub round: usize,
    pub consensus_score: f64,
    /// The score fell below `warning_threshold`. Reported regardless of `state`.
    pub warning: bool,
    /// Score change against the previous round; `None` for the first round.
    pub delta: Option<f64>,
    /// `InProgress` means another round must run.
    pub state: FinalState,
}

impl RoundDecision {
    pub fn should_continue(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Decides, after each round, whether the session continues or stops.
///
/// # Examples
///
/// ```
/// use consensus_engine::{ConsensusConfig, FinalState, RoundController};
///
/// let controller = RoundController::new(ConsensusConfig::default().with_max_rounds(3));
///
/// // Round 1 is always followed by round 2 (min_rounds = 2), even at 0.95.
/// assert_eq!(controller.decide(&[0.95]).state, FinalState::InProgress);
/// assert_eq!(controller.decide(&[0.95, 0.93]).state, FinalState::ConsensusReached);
/// assert_eq!(controller.decide(&[0.5, 0.6, 0.65]).state, FinalState::MaxRoundsExhausted);
/// ```
#[derive(Debug, Clone)]
pub struct RoundController {
    config: ConsensusConfig,
}

impl RoundController {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Decide the transition after the last entry of `scores`.
    ///
    /// `scores[i]` is the consensus score of round `i + 1`. An empty history
    /// stays `InProgress`.
    pub fn decide(&self, scores: &[f64]) -> RoundDecision {
        let round = scores.len();
        let score = match scores.last() {
            Some(score) => *score,
            None => {
                return RoundDecision {
                    round: 0,
                    consensus_score: 0.0,
                    warning: false,
                    delta: None,
                    state: FinalState::InProgress,
                }
            }
        };

        let delta = if round >= 2 {
            Some(score - scores[round - 2])
        } else {
            None
        };
        let warning = score < self.config.warning_threshold;

        let state = if round < self.config.min_rounds {
            FinalState::InProgress
        } else if score >= self.config.threshold {
            FinalState::ConsensusReached
        } else if round >= self.config.max_rounds {
            FinalState::MaxRoundsExhausted
        } else {
            match delta {
                Some(d) if round > self.config.min_rounds && d.abs() < self.config.stagnation_threshold => {
                    FinalState::HumanReviewRequired(HumanReviewReason::Stagnation)
                }
                _ => FinalState::InProgress,
            }
        };

        RoundDecision {
            round,
            consensus_score: score,
            warning,
            delta,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(config: ConsensusConfig) -> RoundController {
        RoundController::new(config)
    }

    #[test]
    fn min_rounds_floor_beats_early_success() {
        let c = controller(ConsensusConfig::default().with_threshold(0.5));
        let decision = c.decide(&[0.95]);
        assert_eq!(decision.state, FinalState::InProgress);
        assert!(decision.should_continue());
    }

    #[test]
    fn stagnation_after_min_rounds() {
        let c = controller(ConsensusConfig::default());
        assert_eq!(c.decide(&[0.4, 0.60]).state, FinalState::InProgress);
        let decision = c.decide(&[0.4, 0.60, 0.605]);
        assert_eq!(
            decision.state,
            FinalState::HumanReviewRequired(HumanReviewReason::Stagnation)
        );
        assert!((decision.delta.unwrap() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn no_stagnation_check_at_min_rounds() {
        // Round 2 equals min_rounds, so a flat score is not yet stagnation.
        let c = controller(ConsensusConfig::default());
        assert_eq!(c.decide(&[0.5, 0.5]).state, FinalState::InProgress);
    }

    #[test]
    fn stagnation_skipped_for_first_round() {
        let c = controller(ConsensusConfig::default().with_min_rounds(1));
        assert_eq!(c.decide(&[0.5]).state, FinalState::InProgress);
        assert_eq!(c.decide(&[0.5]).delta, None);
    }

    #[test]
    fn negative_delta_also_stagnates() {
        let c = controller(ConsensusConfig::default());
        let decision = c.decide(&[0.3, 0.6, 0.59]);
        assert_eq!(
            decision.state,
            FinalState::HumanReviewRequired(HumanReviewReason::Stagnation)
        );
    }

    #[test]
    fn max_rounds_checked_before_stagnation() {
        let c = controller(ConsensusConfig::default().with_max_rounds(3));
        assert_eq!(c.decide(&[0.5, 0.6, 0.6]).state, FinalState::MaxRoundsExhausted);
    }

    #[test]
    fn warning_is_independent_of_state() {
        let c = controller(ConsensusConfig::default());
        let first = c.decide(&[0.25]);
        assert!(first.warning);
        assert_eq!(first.state, FinalState::InProgress);

        let c = controller(ConsensusConfig::default().with_max_rounds(2));
        let last = c.decide(&[0.25, 0.25]);
        assert!(last.warning);
        assert_eq!(last.state, FinalState::MaxRoundsExhausted);
    }

    #[test]
    fn reason_codes() {
        assert_eq!(HumanReviewReason::Stagnation.code(), "stagnation");
        assert_eq!(HumanReviewReason::InsufficientAgents.code(), "insufficient_agents");
        assert_eq!(HumanReviewReason::Cancelled.code(), "cancelled");
    }
}
