//! Multi-round consensus execution.
//!
//! A [`ConsensusEngine`] owns the panel of [`AgentAdapter`]s and the policies a
//! session runs under. [`ConsensusEngine::start_session`] spawns the round loop
//! on the tokio runtime and returns a [`SessionHandle`] immediately:
//!
//! ```text
//! start_session ──► round r: cancel check
//!                     ├─ tokio::spawn per adapter (timeout + retries)
//!                     ├─ join within the round deadline
//!                     ├─ extract documents, drop failed agents
//!                     ├─ evaluate ─► persist ─► RoundController::decide
//!                     └─ publish snapshot, continue or stop
//!                 ──► SessionHandle::wait() -> SessionReport
//! ```
//!
//! Every adapter of a round is called concurrently; the round does not begin
//! evaluation until each call has settled (success, exhausted retries or the
//! round deadline). Agents that fail are excluded from that round only.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use consensus_engine::{AgentAdapter, ConsensusConfig, ConsensusEngine, RoundContext};
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! struct Fixed(&'static str);
//!
//! #[async_trait]
//! impl AgentAdapter for Fixed {
//!     fn id(&self) -> &str {
//!         self.0
//!     }
//!     async fn analyze(&self, _: &str, _: &RoundContext) -> Result<String, Box<dyn Error + Send + Sync>> {
//!         Ok("## Claims\n- The cache is safe\n## Risks\n- Stale reads".to_string())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
//! let mut engine = ConsensusEngine::new(ConsensusConfig::default());
//! engine.add_adapter(Arc::new(Fixed("architect")))?;
//! engine.add_adapter(Arc::new(Fixed("reviewer")))?;
//!
//! let report = engine.start_session("analyze", "Review the cache design")?.wait().await?;
//! println!("{} after {} rounds", report.final_state, report.total_rounds());
//! # Ok(())
//! # }
//! ```

use crate::consensus::adapter::{AgentAdapter, RoundContext};
use crate::consensus::config::{ConsensusConfig, ExecutionPolicy};
use crate::consensus::controller::HumanReviewReason;
use crate::consensus::document::AnalysisDocument;
use crate::consensus::error::ConsensusError;
use crate::consensus::evaluator::{ConsensusEvaluator, RoundResult};
use crate::consensus::event::{ConsensusEvent, EventHandler};
use crate::consensus::extractor::{Extractor, MarkdownExtractor};
use crate::consensus::session::{ConsensusSession, SessionReport, SessionSnapshot};
use crate::consensus::store::{NoopRoundStore, RoundStore};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Runs consensus sessions over a fixed panel of agents.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    policy: ExecutionPolicy,
    extractor: Arc<dyn Extractor>,
    adapters: Vec<Arc<dyn AgentAdapter>>,
    store: Arc<dyn RoundStore>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ConsensusEngine {
    /// Engine with the default [`ExecutionPolicy`], a [`MarkdownExtractor`],
    /// no persistence and no event handler.
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            policy: ExecutionPolicy::default(),
            extractor: Arc::new(MarkdownExtractor::new()),
            adapters: Vec::new(),
            store: Arc::new(NoopRoundStore),
            event_handler: None,
        }
    }

    pub fn with_execution_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RoundStore>) -> Self {
        self.store = store;
        self
    }

    /// Register a handler that receives every [`ConsensusEvent`] of every session.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Add an agent to the panel.
    ///
    /// # Errors
    ///
    /// [`ConsensusError::Config`] if an adapter with the same id is registered.
    pub fn add_adapter(&mut self, adapter: Arc<dyn AgentAdapter>) -> Result<(), ConsensusError> {
        if self.adapters.iter().any(|a| a.id() == adapter.id()) {
            return Err(ConsensusError::Config(format!(
                "duplicate agent id '{}'",
                adapter.id()
            )));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn execution_policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    pub fn adapter_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    /// Start a new session for `phase_id` and return without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ConsensusError::Config`] for an invalid configuration, an empty panel,
    /// or a single adapter without `single_agent_bypass`.
    pub fn start_session(
        &self,
        phase_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<SessionHandle, ConsensusError> {
        self.check_panel()?;
        let session = ConsensusSession::new(phase_id, self.config.clone())?;
        Ok(self.spawn(session, prompt.into()))
    }

    /// Continue a session from persisted rounds, for example those returned
    /// by [`JsonlRoundStore::load_rounds`](crate::JsonlRoundStore::load_rounds).
    ///
    /// The next round is `history.len() + 1`. A history that already reached a
    /// terminal state resolves immediately with that state.
    pub fn resume_session(
        &self,
        phase_id: impl Into<String>,
        prompt: impl Into<String>,
        history: Vec<RoundResult>,
    ) -> Result<SessionHandle, ConsensusError> {
        self.check_panel()?;
        let session = ConsensusSession::restore(phase_id, self.config.clone(), history)?;
        Ok(self.spawn(session, prompt.into()))
    }

    /// Start a session and wait for its report.
    pub async fn run_session(
        &self,
        phase_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<SessionReport, ConsensusError> {
        self.start_session(phase_id, prompt)?.wait().await
    }

    fn check_panel(&self) -> Result<(), ConsensusError> {
        self.config.validate()?;
        match self.adapters.len() {
            0 => Err(ConsensusError::Config(
                "a consensus session needs at least one agent adapter".to_string(),
            )),
            1 if !self.config.single_agent_bypass => Err(ConsensusError::Config(
                "a consensus session needs at least 2 agent adapters \
                 (enable single_agent_bypass to run with one)"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn spawn(&self, session: ConsensusSession, prompt: String) -> SessionHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = watch::channel(Arc::new(session.snapshot()));

        let runner = SessionRunner {
            prompt,
            policy: self.policy.clone(),
            extractor: Arc::clone(&self.extractor),
            adapters: self.adapters.clone(),
            store: Arc::clone(&self.store),
            event_handler: self.event_handler.clone(),
            evaluator: ConsensusEvaluator::new(self.config.weights),
            single_agent: self.adapters.len() == 1,
            cancelled: Arc::clone(&cancelled),
            snapshots: sender,
        };

        SessionHandle {
            session_id: session.session_id().to_string(),
            phase_id: session.phase_id().to_string(),
            cancelled,
            snapshots: receiver,
            task: tokio::spawn(runner.run(session)),
        }
    }
}

/// Start a session over `adapters` with default policies.
///
/// Shorthand for building a [`ConsensusEngine`] and calling
/// [`start_session`](ConsensusEngine::start_session).
pub fn start_session(
    phase_id: impl Into<String>,
    prompt: impl Into<String>,
    config: ConsensusConfig,
    adapters: Vec<Arc<dyn AgentAdapter>>,
) -> Result<SessionHandle, ConsensusError> {
    let mut engine = ConsensusEngine::new(config);
    for adapter in adapters {
        engine.add_adapter(adapter)?;
    }
    engine.start_session(phase_id, prompt)
}

/// Handle to a running session.
///
/// Dropping the handle does not stop the session; call [`cancel`](Self::cancel).
pub struct SessionHandle {
    session_id: String,
    phase_id: String,
    cancelled: Arc<AtomicBool>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
    task: JoinHandle<Result<SessionReport, ConsensusError>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase_id(&self) -> &str {
        &self.phase_id
    }

    /// Request cancellation. Takes effect at the next round boundary or retry,
    /// and the session ends as `HumanReviewRequired(cancelled)`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Latest published state. Updated after every round and at the end.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to reach a terminal state.
    ///
    /// Human-review outcomes (stagnation, insufficient agents, cancellation)
    /// are reports, not errors. Errors are reserved for persistence failures
    /// and internal faults.
    pub async fn wait(self) -> Result<SessionReport, ConsensusError> {
        self.task.await.map_err(|e| {
            ConsensusError::ExecutionFailed(format!("session task join error: {}", e))
        })?
    }
}

/// Everything the spawned round loop needs, detached from the engine.
struct SessionRunner {
    prompt: String,
    policy: ExecutionPolicy,
    extractor: Arc<dyn Extractor>,
    adapters: Vec<Arc<dyn AgentAdapter>>,
    store: Arc<dyn RoundStore>,
    event_handler: Option<Arc<dyn EventHandler>>,
    evaluator: ConsensusEvaluator,
    single_agent: bool,
    cancelled: Arc<AtomicBool>,
    snapshots: watch::Sender<Arc<SessionSnapshot>>,
}

impl SessionRunner {
    async fn emit(&self, event: ConsensusEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_consensus_event(&event).await;
        }
    }

    fn publish(&self, session: &ConsensusSession) {
        self.snapshots.send_replace(Arc::new(session.snapshot()));
    }

    async fn run(self, mut session: ConsensusSession) -> Result<SessionReport, ConsensusError> {
        let phase_id = session.phase_id().to_string();

        if !session.is_finished() {
            log::info!(
                "Consensus session {} for phase '{}' starting at round {} with {} agent(s)",
                session.session_id(),
                phase_id,
                session.next_round(),
                self.adapters.len()
            );
            self.emit(ConsensusEvent::SessionStarted {
                phase_id: phase_id.clone(),
                session_id: session.session_id().to_string(),
                agent_count: self.adapters.len(),
                first_round: session.next_round(),
            })
            .await;

            if let Err(e) = self
                .store
                .begin_session(&phase_id, session.session_id(), session.next_round())
                .await
            {
                log::error!("Phase '{}': failed to prepare round store: {}", phase_id, e);
                return Err(ConsensusError::Persistence(e.to_string()));
            }
        }

        while !session.is_finished() {
            let round = session.next_round();

            if self.cancelled.load(Ordering::SeqCst) {
                log::warn!("Phase '{}': cancelled before round {}", phase_id, round);
                session.require_human_review(
                    HumanReviewReason::Cancelled,
                    ConsensusError::Cancelled { round }.to_string(),
                );
                break;
            }

            self.emit(ConsensusEvent::RoundStarted {
                phase_id: phase_id.clone(),
                round,
            })
            .await;

            let context = match session.last_round() {
                Some(previous) => RoundContext::after(phase_id.clone(), Arc::clone(previous)),
                None => RoundContext::first(phase_id.clone()),
            };
            let collected = self.collect_round(&context).await;

            if let Some(agent_id) = &collected.cancelled_retry {
                log::warn!(
                    "Phase '{}': cancelled in round {} before retrying agent '{}'",
                    phase_id,
                    round,
                    agent_id
                );
                session.require_human_review(
                    HumanReviewReason::Cancelled,
                    format!("Session cancelled in round {} before retrying agent '{}'", round, agent_id),
                );
                break;
            }

            let RoundCollection {
                documents,
                failed: failed_agents,
                ..
            } = collected;

            let required = if self.single_agent { 1 } else { 2 };
            if documents.len() < required {
                let error = ConsensusError::InsufficientAgents {
                    round,
                    available: documents.len(),
                };
                log::warn!("Phase '{}': {}", phase_id, error);
                session.require_human_review(HumanReviewReason::InsufficientAgents, error.to_string());
                break;
            }

            let mut result = self.evaluator.evaluate(&documents)?;
            result.failed_agents = failed_agents;

            if let Err(e) = self.store.persist_round(&phase_id, &result).await {
                log::error!("Phase '{}' round {}: failed to persist round: {}", phase_id, round, e);
                return Err(ConsensusError::Persistence(e.to_string()));
            }

            let per_category_score = result.per_category_score;
            let decision = session.record_round(result)?;

            log::info!(
                "Phase '{}' round {}: score {:.3} (claims {:.3}, risks {:.3}, recommendations {:.3}) -> {}",
                phase_id,
                round,
                decision.consensus_score,
                per_category_score.claims,
                per_category_score.risks,
                per_category_score.recommendations,
                decision.state
            );

            self.emit(ConsensusEvent::RoundEvaluated {
                phase_id: phase_id.clone(),
                round,
                consensus_score: decision.consensus_score,
                per_category_score,
            })
            .await;

            if decision.warning {
                log::warn!(
                    "Phase '{}' round {}: consensus score {:.3} is below the warning threshold",
                    phase_id,
                    round,
                    decision.consensus_score
                );
                self.emit(ConsensusEvent::ConsensusWarning {
                    phase_id: phase_id.clone(),
                    round,
                    consensus_score: decision.consensus_score,
                })
                .await;
            }

            self.publish(&session);
        }

        self.publish(&session);
        log::info!(
            "Consensus session {} for phase '{}' finished as {} after {} round(s)",
            session.session_id(),
            phase_id,
            session.final_state(),
            session.rounds().len()
        );
        self.emit(ConsensusEvent::SessionFinished {
            phase_id,
            final_state: session.final_state(),
            total_rounds: session.rounds().len(),
        })
        .await;

        Ok(session.into_report())
    }

    /// Call every adapter concurrently and wait for all of them to settle.
    ///
    /// Failed agents are dropped from the round; a cancellation seen at a
    /// retry checkpoint is reported separately so the caller can stop.
    async fn collect_round(&self, context: &RoundContext) -> RoundCollection {
        let prompt = context.compose_prompt(&self.prompt);
        let deadline = self.policy.round_timeout.map(|t| Instant::now() + t);

        let tasks: Vec<(String, JoinHandle<Result<String, ConsensusError>>)> = self
            .adapters
            .iter()
            .map(|adapter| {
                let call = AgentCall {
                    adapter: Arc::clone(adapter),
                    prompt: prompt.clone(),
                    context: context.clone(),
                    policy: self.policy.clone(),
                    cancelled: Arc::clone(&self.cancelled),
                    event_handler: self.event_handler.clone(),
                };
                (adapter.id().to_string(), tokio::spawn(call.run()))
            })
            .collect();

        let settled = join_all(tasks.into_iter().map(|(agent_id, mut task)| async move {
            let outcome = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut task).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        task.abort();
                        None
                    }
                },
                None => Some(task.await),
            };
            (agent_id, outcome)
        }))
        .await;

        let mut collected = RoundCollection::default();
        for (agent_id, outcome) in settled {
            let error = match outcome {
                Some(Ok(Ok(raw_text))) => {
                    let document = AnalysisDocument::from_text(
                        agent_id.clone(),
                        context.round,
                        raw_text,
                        self.extractor.as_ref(),
                    );
                    if !document.structured {
                        log::debug!(
                            "Phase '{}' round {}: no category markers in response from '{}'",
                            context.phase_id,
                            context.round,
                            agent_id
                        );
                    }
                    self.emit(ConsensusEvent::AgentResponded {
                        phase_id: context.phase_id.clone(),
                        round: context.round,
                        agent_id: agent_id.clone(),
                        statement_count: document.statement_count(),
                        structured: document.structured,
                    })
                    .await;
                    collected.documents.push(document);
                    continue;
                }
                Some(Ok(Err(error @ ConsensusError::Cancelled { .. }))) => {
                    if collected.cancelled_retry.is_none() {
                        collected.cancelled_retry = Some(agent_id.clone());
                    }
                    error.to_string()
                }
                Some(Ok(Err(error))) => error.to_string(),
                Some(Err(join_error)) => format!("agent task join error: {}", join_error),
                None => "round deadline elapsed".to_string(),
            };

            log::warn!(
                "Phase '{}' round {}: dropping agent '{}': {}",
                context.phase_id,
                context.round,
                agent_id,
                error
            );
            self.emit(ConsensusEvent::AgentFailed {
                phase_id: context.phase_id.clone(),
                round: context.round,
                agent_id: agent_id.clone(),
                error,
            })
            .await;
            collected.failed.push(agent_id);
        }

        collected
    }
}

/// What one round's fan-out produced.
#[derive(Default)]
struct RoundCollection {
    documents: Vec<AnalysisDocument>,
    failed: Vec<String>,
    /// First agent whose retry was abandoned because the session was cancelled.
    cancelled_retry: Option<String>,
}

/// One adapter's work for one round, moved into its own task.
struct AgentCall {
    adapter: Arc<dyn AgentAdapter>,
    prompt: String,
    context: RoundContext,
    policy: ExecutionPolicy,
    cancelled: Arc<AtomicBool>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl AgentCall {
    /// Call the adapter until it succeeds or the retry budget is spent.
    async fn run(self) -> Result<String, ConsensusError> {
        let mut attempt = 1;
        loop {
            let context = self.context.with_attempt(attempt);
            let call = self.adapter.analyze(&self.prompt, &context);
            let error = match tokio::time::timeout(self.policy.call_timeout, call).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("call timed out after {:?}", self.policy.call_timeout),
            };

            if attempt > self.policy.max_retries {
                return Err(ConsensusError::Adapter {
                    agent_id: self.adapter.id().to_string(),
                    message: format!("{} (after {} attempt(s))", error, attempt),
                });
            }
            if self.cancelled.load(Ordering::SeqCst) {
                log::debug!(
                    "Agent '{}' round {}: {}; not retrying, session cancelled",
                    self.adapter.id(),
                    self.context.round,
                    error
                );
                return Err(ConsensusError::Cancelled {
                    round: self.context.round,
                });
            }

            attempt += 1;
            log::debug!(
                "Agent '{}' round {}: {}; retrying (attempt {})",
                self.adapter.id(),
                self.context.round,
                error,
                attempt
            );
            if let Some(handler) = &self.event_handler {
                handler
                    .on_consensus_event(&ConsensusEvent::AgentRetrying {
                        phase_id: self.context.phase_id.clone(),
                        round: self.context.round,
                        agent_id: self.adapter.id().to_string(),
                        attempt,
                        error,
                    })
                    .await;
            }
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}
