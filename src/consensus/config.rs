//! Session configuration.
//!
//! Provides [`ConsensusConfig`] (thresholds and round limits), [`CategoryWeights`]
//! (how the three statement categories combine into one score) and
//! [`ExecutionPolicy`] (retries and timeouts for adapter calls). Callers build
//! these values however they like; each session receives its own immutable copy,
//! so concurrent sessions with different settings never interfere.
//!
//! # Example
//!
//! ```rust
//! use consensus_engine::ConsensusConfig;
//!
//! let config = ConsensusConfig::default()
//!     .with_threshold(0.85)
//!     .with_max_rounds(4);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.min_rounds, 2);
//! ```

use crate::consensus::document::Category;
use crate::consensus::error::ConsensusError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tolerance used when checking that category weights sum to one.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Relative weight of each category in the round-level consensus score.
///
/// The defaults are claims 0.40, risks 0.30, recommendations 0.30.
///
/// ```rust
/// use consensus_engine::CategoryWeights;
///
/// let weights = CategoryWeights::default();
/// assert!((weights.total() - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub claims: f64,
    pub risks: f64,
    pub recommendations: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            claims: 0.40,
            risks: 0.30,
            recommendations: 0.30,
        }
    }
}

impl CategoryWeights {
    /// Weight assigned to `category`.
    pub fn weight(&self, category: Category) -> f64 {
        match category {
            Category::Claims => self.claims,
            Category::Risks => self.risks,
            Category::Recommendations => self.recommendations,
        }
    }

    pub fn total(&self) -> f64 {
        self.claims + self.risks + self.recommendations
    }

    /// Reject negative weights and weights that do not sum to one.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        for category in Category::ALL {
            let w = self.weight(category);
            if !w.is_finite() || w < 0.0 {
                return Err(ConsensusError::Config(format!(
                    "weight for {} must be a non-negative number, got {}",
                    category, w
                )));
            }
        }
        if (self.total() - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConsensusError::Config(format!(
                "category weights must sum to 1.0, got {}",
                self.total()
            )));
        }
        Ok(())
    }
}

/// Thresholds and round limits for one consensus session.
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `threshold` | 0.90 | score at or above which consensus is reached |
/// | `min_rounds` | 2 | rounds that always run before success is trusted |
/// | `max_rounds` | 5 | hard cap on rounds |
/// | `warning_threshold` | 0.30 | scores below this emit a warning |
/// | `stagnation_threshold` | 0.02 | minimum round-over-round improvement |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub threshold: f64,
    pub min_rounds: usize,
    pub max_rounds: usize,
    pub warning_threshold: f64,
    pub stagnation_threshold: f64,
    pub weights: CategoryWeights,
    /// Allow a session with exactly one adapter. A lone agent trivially agrees
    /// with itself, so every category scores 1.0.
    pub single_agent_bypass: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: 0.90,
            min_rounds: 2,
            max_rounds: 5,
            warning_threshold: 0.30,
            stagnation_threshold: 0.02,
            weights: CategoryWeights::default(),
            single_agent_bypass: false,
        }
    }
}

impl ConsensusConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_min_rounds(mut self, min_rounds: usize) -> Self {
        self.min_rounds = min_rounds;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_warning_threshold(mut self, warning_threshold: f64) -> Self {
        self.warning_threshold = warning_threshold;
        self
    }

    pub fn with_stagnation_threshold(mut self, stagnation_threshold: f64) -> Self {
        self.stagnation_threshold = stagnation_threshold;
        self
    }

    pub fn with_weights(mut self, weights: CategoryWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_single_agent_bypass(mut self, enabled: bool) -> Self {
        self.single_agent_bypass = enabled;
        self
    }

    /// Check every invariant of the configuration.
    ///
    /// `0 <= warning_threshold <= threshold <= 1`, `min_rounds >= 1`,
    /// `max_rounds >= min_rounds`, `stagnation_threshold >= 0` and valid weights.
    ///
    /// ```rust
    /// use consensus_engine::ConsensusConfig;
    ///
    /// let bad = ConsensusConfig::default().with_min_rounds(6);
    /// assert!(bad.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConsensusError::Config(format!(
                "threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=self.threshold).contains(&self.warning_threshold) {
            return Err(ConsensusError::Config(format!(
                "warning_threshold must lie in [0, threshold], got {}",
                self.warning_threshold
            )));
        }
        if self.min_rounds < 1 {
            return Err(ConsensusError::Config(
                "min_rounds must be at least 1".to_string(),
            ));
        }
        if self.max_rounds < self.min_rounds {
            return Err(ConsensusError::Config(format!(
                "max_rounds ({}) must be >= min_rounds ({})",
                self.max_rounds, self.min_rounds
            )));
        }
        if !self.stagnation_threshold.is_finite() || self.stagnation_threshold < 0.0 {
            return Err(ConsensusError::Config(format!(
                "stagnation_threshold must be non-negative, got {}",
                self.stagnation_threshold
            )));
        }
        self.weights.validate()
    }
}

/// Retry and timeout limits applied to adapter calls.
///
/// Retries and timeouts belong to the adapter boundary; the engine only needs
/// to know the budget so it can drop an agent once the budget is spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Additional attempts after the first failed call.
    pub max_retries: usize,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Limit for a single adapter call.
    pub call_timeout: Duration,
    /// Limit for the whole join of one round, retries included. `None` waits
    /// for every agent to settle.
    pub round_timeout: Option<Duration>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
            call_timeout: Duration::from_secs(120),
            round_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl ExecutionPolicy {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_round_timeout(mut self, round_timeout: Option<Duration>) -> Self {
        self.round_timeout = round_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ConsensusConfig::default();
        assert_eq!(config.threshold, 0.90);
        assert_eq!(config.min_rounds, 2);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.warning_threshold, 0.30);
        assert_eq!(config.stagnation_threshold, 0.02);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = ConsensusConfig::default()
            .with_threshold(0.5)
            .with_warning_threshold(0.6);
        assert!(matches!(config.validate(), Err(ConsensusError::Config(_))));
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let weights = CategoryWeights {
            claims: 0.5,
            risks: 0.3,
            recommendations: 0.3,
        };
        let config = ConsensusConfig::default().with_weights(weights);
        assert!(matches!(config.validate(), Err(ConsensusError::Config(_))));
    }

    #[test]
    fn rejects_zero_min_rounds() {
        let config = ConsensusConfig::default().with_min_rounds(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ConsensusConfig =
            serde_json::from_str(r#"{"threshold": 0.8, "max_rounds": 3}"#).unwrap();
        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.min_rounds, 2);
        assert_eq!(config.weights, CategoryWeights::default());
    }
}
