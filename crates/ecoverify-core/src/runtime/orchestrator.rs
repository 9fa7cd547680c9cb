// crates/ecoverify-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: EcoVerify Orchestrator
// Description: State-machine driver with durable, signed transitions.
// Purpose: Execute the investigation pipeline with checkpointing and suspension.
// Dependencies: crate::{core, interfaces, runtime::transitions}
// ============================================================================

//! ## Overview
//! The orchestrator is the single canonical execution path for runs. Every
//! transition is atomic with respect to persistence: the next state,
//! including the signed decision-trace entry, is computed on a working copy,
//! saved, and only then committed and published. A failed save leaves the run
//! at its previously persisted phase, so the checkpoint store is always the
//! source of truth and recovery never replays completed stages.
//!
//! Suspension is a phase, not a blocked task: an interrupted run consumes no
//! execution resource and survives process restarts; resumption is a plain
//! state transition triggered by an external call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::core::ActorId;
use crate::core::ApprovalDecision;
use crate::core::Phase;
use crate::core::RunEvent;
use crate::core::RunId;
use crate::core::RunState;
use crate::core::Severity;
use crate::core::SigningError;
use crate::core::SigningService;
use crate::core::StageOutcome;
use crate::core::SubjectId;
use crate::core::Timestamp;
use crate::core::signing::DecisionTraceEntry;
use crate::interfaces::CheckpointStore;
use crate::interfaces::EventSink;
use crate::interfaces::StageExecutor;
use crate::interfaces::StageFault;
use crate::interfaces::StageOutput;
use crate::interfaces::StoreError;
use crate::runtime::transitions::TransitionError;
use crate::runtime::transitions::next_phase;
use crate::runtime::transitions::resume_target;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the orchestrator.
///
/// # Invariants
/// - `max_persist_attempts` is at least one.
/// - `min_adjustment <= max_adjustment`, both finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Maximum Compliance self-correction retries before the run fails.
    pub max_citation_retries: u32,
    /// Maximum transient stage-fault retries before the run fails.
    pub max_transient_retries: u32,
    /// Save attempts per transition before escalating to a fatal fault.
    pub max_persist_attempts: u32,
    /// Lower bound of the approval adjustment factor (inclusive).
    pub min_adjustment: f64,
    /// Upper bound of the approval adjustment factor (inclusive).
    pub max_adjustment: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_citation_retries: 3,
            max_transient_retries: 2,
            max_persist_attempts: 3,
            min_adjustment: 0.5,
            max_adjustment: 1.5,
        }
    }
}

impl OrchestratorConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] when a bound is out of range.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_persist_attempts == 0 {
            return Err(OrchestratorError::Config(
                "max_persist_attempts must be greater than zero".to_string(),
            ));
        }
        if !self.min_adjustment.is_finite()
            || !self.max_adjustment.is_finite()
            || self.min_adjustment <= 0.0
            || self.min_adjustment > self.max_adjustment
        {
            return Err(OrchestratorError::Config(format!(
                "invalid adjustment bounds: [{}, {}]",
                self.min_adjustment, self.max_adjustment
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Stage Set
// ============================================================================

/// The five stage executors, in pipeline order.
///
/// # Invariants
/// - One executor per pipeline stage; executors are stateless across calls.
pub struct StageSet {
    /// Monitor stage executor.
    monitor: Box<dyn StageExecutor>,
    /// Compliance stage executor.
    compliance: Box<dyn StageExecutor>,
    /// Simulate stage executor.
    simulate: Box<dyn StageExecutor>,
    /// Approval-checkpoint stage executor.
    governor: Box<dyn StageExecutor>,
    /// Finalize stage executor.
    finalize: Box<dyn StageExecutor>,
}

impl StageSet {
    /// Builds a stage set from the five executors.
    #[must_use]
    pub fn new(
        monitor: Box<dyn StageExecutor>,
        compliance: Box<dyn StageExecutor>,
        simulate: Box<dyn StageExecutor>,
        governor: Box<dyn StageExecutor>,
        finalize: Box<dyn StageExecutor>,
    ) -> Self {
        Self {
            monitor,
            compliance,
            simulate,
            governor,
            finalize,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Orchestrator execution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; protocol misuse never
///   mutates state.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Run not found in the checkpoint store.
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    /// Run already exists in the checkpoint store.
    #[error("run already exists: {0}")]
    RunAlreadyExists(RunId),
    /// Run record exists but was never started.
    #[error("run has not been started: {0}")]
    NotStarted(RunId),
    /// Resume called while the run is not awaiting approval.
    #[error("run {0} is not awaiting approval (phase {1:?})")]
    NotInterrupted(RunId, Phase),
    /// Adjustment factor outside the configured bounds.
    #[error("adjustment factor {value} outside [{min}, {max}]")]
    AdjustmentOutOfRange {
        /// Rejected value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Operation attempted on a terminal run.
    #[error("run {0} is terminal (phase {1:?})")]
    RunTerminal(RunId, Phase),
    /// Checkpoint persistence failed after all attempts.
    #[error(transparent)]
    Persistence(#[from] StoreError),
    /// Decision signing failed.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// Transition outside the table.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Invalid orchestrator configuration.
    #[error("invalid orchestrator configuration: {0}")]
    Config(String),
}

// ============================================================================
// SECTION: Verified Trace
// ============================================================================

/// Trace entry paired with its recomputed verification result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedTrace {
    /// The signed trace entry.
    pub entry: DecisionTraceEntry,
    /// Whether the signature verifies against the recorded payload.
    pub verified: bool,
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// State-machine driver for investigation runs.
///
/// # Invariants
/// - At most one stage executes at a time within a given run; distinct runs
///   progress fully independently.
/// - The in-memory view of a run never advances past an unpersisted state.
pub struct Orchestrator<S, E> {
    /// Checkpoint store (source of truth).
    store: S,
    /// Event fan-out.
    events: E,
    /// Decision signing service.
    signer: SigningService,
    /// Stage executors.
    stages: StageSet,
    /// Orchestrator configuration.
    config: OrchestratorConfig,
    /// Per-run execution locks.
    locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl<S, E> Orchestrator<S, E>
where
    S: CheckpointStore,
    E: EventSink,
{
    /// Creates a new orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] when the configuration is
    /// invalid.
    pub fn new(
        store: S,
        events: E,
        signer: SigningService,
        stages: StageSet,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        Ok(Self {
            store,
            events,
            signer,
            stages,
            config,
            locks: Mutex::new(BTreeMap::new()),
        })
    }

    /// Returns the event channel for subscription surfaces.
    #[must_use]
    pub const fn events(&self) -> &E {
        &self.events
    }

    /// Creates a run for a subject, persisting it in the `Starting` phase.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when persistence fails.
    pub fn start(&self, subject: SubjectId) -> Result<RunState, OrchestratorError> {
        let run_id = RunId::generate();
        if self.store.load(&run_id)?.is_some() {
            return Err(OrchestratorError::RunAlreadyExists(run_id));
        }
        let now = Timestamp::now();
        let mut state = RunState::new(run_id.clone(), subject, now);
        state.phase = Phase::Starting;
        self.persist(&state)?;
        self.events.publish(&run_id, RunEvent::PhaseChange {
            phase: Phase::Starting,
        });
        Ok(state)
    }

    /// Executes at most one transition for the run.
    ///
    /// Interrupted and terminal runs are left untouched; the returned phase
    /// reflects the run after the step.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the run is missing or a transition
    /// cannot be persisted or signed.
    pub fn advance(&self, run_id: &RunId) -> Result<Phase, OrchestratorError> {
        let lock = self.run_lock(run_id);
        let _guard = acquire(&lock);
        let mut state = self.load_required(run_id)?;
        self.step(&mut state)?;
        Ok(state.phase)
    }

    /// Drives the run until it suspends at `Interrupted` or terminates.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the run is missing or a transition
    /// cannot be persisted or signed.
    pub fn run_until_suspended(&self, run_id: &RunId) -> Result<Phase, OrchestratorError> {
        let lock = self.run_lock(run_id);
        let _guard = acquire(&lock);
        let mut state = self.load_required(run_id)?;
        self.drive(&mut state)?;
        Ok(state.phase)
    }

    /// Applies an external approval decision to an interrupted run and drives
    /// it to completion.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInterrupted`] when the run is not
    /// awaiting approval and [`OrchestratorError::AdjustmentOutOfRange`] when
    /// the adjustment factor is outside the configured bounds. Protocol
    /// misuse never mutates state.
    pub fn resume(
        &self,
        run_id: &RunId,
        approved: bool,
        adjustment: f64,
    ) -> Result<Phase, OrchestratorError> {
        let lock = self.run_lock(run_id);
        let _guard = acquire(&lock);
        let mut state = self.load_required(run_id)?;
        if state.phase.is_terminal() {
            return Err(OrchestratorError::RunTerminal(run_id.clone(), state.phase));
        }
        if state.phase != Phase::Interrupted {
            return Err(OrchestratorError::NotInterrupted(run_id.clone(), state.phase));
        }
        if !adjustment.is_finite()
            || adjustment < self.config.min_adjustment
            || adjustment > self.config.max_adjustment
        {
            return Err(OrchestratorError::AdjustmentOutOfRange {
                value: adjustment,
                min: self.config.min_adjustment,
                max: self.config.max_adjustment,
            });
        }

        let now = Timestamp::now();
        let mut candidate = state.clone();
        candidate.approval = Some(ApprovalDecision {
            granted: approved,
            adjustment_factor: adjustment,
            decided_at: now,
        });
        let decision = json!({
            "action": "human_approval",
            "approved": approved,
            "adjustment_factor": adjustment,
        });
        let seq = candidate.decision_trace.len() as u64 + 1;
        let entry = self.signer.sign(ActorId::Governor, seq, decision, now)?;
        candidate.decision_trace.push(entry);
        candidate.phase = resume_target(approved);
        candidate.updated_at = now;
        self.persist(&candidate)?;
        state = candidate;

        let message = if approved {
            "Action approved by operator."
        } else {
            "Action denied by operator. Pipeline ends without execution."
        };
        let severity = if approved { Severity::Low } else { Severity::Medium };
        self.events.publish(run_id, feed(ActorId::Governor, message, severity));
        self.events.publish(run_id, RunEvent::PhaseChange {
            phase: state.phase,
        });

        self.drive(&mut state)?;
        Ok(state.phase)
    }

    /// Transitions a non-terminal run directly to `Error` with a reason.
    ///
    /// Any in-flight stage call is abandoned rather than killed; its result is
    /// ignored because the persisted phase has already moved on.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunTerminal`] when the run already
    /// terminated.
    pub fn cancel(&self, run_id: &RunId, reason: &str) -> Result<Phase, OrchestratorError> {
        let lock = self.run_lock(run_id);
        let _guard = acquire(&lock);
        let mut state = self.load_required(run_id)?;
        if state.phase.is_terminal() {
            return Err(OrchestratorError::RunTerminal(run_id.clone(), state.phase));
        }
        self.fail_run(&mut state, format!("run cancelled: {reason}"))?;
        Ok(state.phase)
    }

    /// Returns the persisted snapshot for a run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunNotFound`] when the run is unknown.
    pub fn snapshot(&self, run_id: &RunId) -> Result<RunState, OrchestratorError> {
        self.load_required(run_id)
    }

    /// Returns the decision trace with `verified` recomputed per entry.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunNotFound`] when the run is unknown.
    pub fn traces(&self, run_id: &RunId) -> Result<Vec<VerifiedTrace>, OrchestratorError> {
        let state = self.load_required(run_id)?;
        Ok(state
            .decision_trace
            .into_iter()
            .map(|entry| VerifiedTrace {
                verified: self.signer.verify(&entry),
                entry,
            })
            .collect())
    }

    /// Re-hydrates in-flight runs after a restart, driving each back to its
    /// next suspension point. Interrupted runs stay parked; completed stages
    /// are never re-executed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Persistence`] when the active-run listing
    /// fails. Per-run drive failures are skipped so one damaged run cannot
    /// block recovery of the rest.
    pub fn recover(&self) -> Result<Vec<RunId>, OrchestratorError> {
        let mut recovered = Vec::new();
        for run_id in self.store.list_active()? {
            let Ok(state) = self.load_required(&run_id) else {
                continue;
            };
            if state.phase == Phase::Interrupted || state.phase.is_terminal() {
                recovered.push(run_id);
                continue;
            }
            if self.run_until_suspended(&run_id).is_ok() {
                recovered.push(run_id);
            }
        }
        Ok(recovered)
    }

    // ------------------------------------------------------------------
    // Internal stepping
    // ------------------------------------------------------------------

    /// Drives the run until it suspends or terminates. Caller holds the run
    /// lock.
    fn drive(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        while !state.phase.is_terminal() && state.phase != Phase::Interrupted {
            self.step(state)?;
        }
        Ok(())
    }

    /// Executes at most one transition. Caller holds the run lock.
    fn step(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        match state.phase {
            Phase::Idle => Err(OrchestratorError::NotStarted(state.run_id.clone())),
            Phase::Starting => self.execute_stage(state, self.stages.monitor.as_ref()),
            Phase::MonitorDone => self.execute_stage(state, self.stages.compliance.as_ref()),
            Phase::ComplianceRetry => self.resolve_retry(state),
            Phase::ComplianceDone => self.execute_stage(state, self.stages.simulate.as_ref()),
            Phase::SimulateDone => self.execute_stage(state, self.stages.governor.as_ref()),
            Phase::ApprovalGranted => self.execute_stage(state, self.stages.finalize.as_ref()),
            Phase::ApprovalDenied => self.close_denied(state),
            Phase::Interrupted | Phase::Complete | Phase::Error => Ok(()),
        }
    }

    /// Runs one stage executor and applies its output or fault.
    fn execute_stage(
        &self,
        state: &mut RunState,
        stage: &dyn StageExecutor,
    ) -> Result<(), OrchestratorError> {
        match stage.execute(state) {
            Ok(output) => self.apply_output(state, stage.actor(), output),
            Err(StageFault::Transient(reason)) => self.handle_transient(state, &reason),
            Err(StageFault::Fatal(reason)) => {
                self.fail_run(state, format!("fatal stage fault: {reason}"))
            }
        }
    }

    /// Applies a stage output as one atomic persisted transition.
    fn apply_output(
        &self,
        state: &mut RunState,
        actor: ActorId,
        output: StageOutput,
    ) -> Result<(), OrchestratorError> {
        let next = match next_phase(state.phase, output.outcome) {
            Ok(next) => next,
            Err(err) => return self.fail_run(state, err.to_string()),
        };

        let now = Timestamp::now();
        let mut candidate = state.clone();
        if output.outcome == StageOutcome::CitationsInvalid {
            candidate.retry_count += 1;
        }
        candidate.apply(output.update);
        if let Some(decision) = output.decision {
            let seq = candidate.decision_trace.len() as u64 + 1;
            let entry = self.signer.sign(actor, seq, decision, now)?;
            candidate.decision_trace.push(entry);
        }
        candidate.phase = next;
        candidate.updated_at = now;
        self.persist(&candidate)?;
        *state = candidate;

        for event in output.events {
            self.events.publish(&state.run_id, event);
        }
        self.events.publish(&state.run_id, RunEvent::PhaseChange {
            phase: state.phase,
        });
        if state.phase == Phase::Interrupted {
            self.events.publish(&state.run_id, RunEvent::Interrupt {});
        }
        if state.phase.is_terminal() {
            self.events.publish(&state.run_id, RunEvent::Complete {
                phase: state.phase,
            });
        }
        Ok(())
    }

    /// Resolves the self-correction loop: re-enter `MonitorDone` to re-invoke
    /// only Compliance, or fail once the retry budget is exhausted.
    fn resolve_retry(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        if state.retry_count > self.config.max_citation_retries {
            return self.fail_run(
                state,
                format!(
                    "citation validation exhausted after {} retries",
                    state.retry_count - 1
                ),
            );
        }
        let now = Timestamp::now();
        let mut candidate = state.clone();
        candidate.phase = Phase::MonitorDone;
        candidate.updated_at = now;
        self.persist(&candidate)?;
        *state = candidate;
        self.events.publish(
            &state.run_id,
            RunEvent::system_feed(
                format!("Re-invoking compliance evaluation (attempt {}).", state.retry_count + 1),
                Severity::Medium,
            ),
        );
        self.events.publish(&state.run_id, RunEvent::PhaseChange {
            phase: state.phase,
        });
        Ok(())
    }

    /// Records a transient fault and leaves the phase unchanged for retry.
    fn handle_transient(
        &self,
        state: &mut RunState,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        if state.transient_retries >= self.config.max_transient_retries {
            return self.fail_run(state, format!("transient retries exhausted: {reason}"));
        }
        let now = Timestamp::now();
        let mut candidate = state.clone();
        candidate.transient_retries += 1;
        candidate.error_log.push(format!("transient stage fault: {reason}"));
        candidate.updated_at = now;
        self.persist(&candidate)?;
        *state = candidate;
        self.events.publish(
            &state.run_id,
            RunEvent::system_feed(
                format!("Stage fault, will retry: {reason}"),
                Severity::High,
            ),
        );
        Ok(())
    }

    /// Completes a denied run without settlement.
    fn close_denied(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        let now = Timestamp::now();
        let mut candidate = state.clone();
        candidate.phase = Phase::Complete;
        candidate.updated_at = now;
        self.persist(&candidate)?;
        *state = candidate;
        self.events.publish(
            &state.run_id,
            RunEvent::system_feed("Pipeline closed without settlement.", Severity::Low),
        );
        self.events.publish(&state.run_id, RunEvent::PhaseChange {
            phase: state.phase,
        });
        self.events.publish(&state.run_id, RunEvent::Complete {
            phase: state.phase,
        });
        Ok(())
    }

    /// Marks the run as failed, persisting the reason.
    fn fail_run(&self, state: &mut RunState, reason: String) -> Result<(), OrchestratorError> {
        let now = Timestamp::now();
        let mut candidate = state.clone();
        candidate.phase = Phase::Error;
        candidate.error_log.push(reason.clone());
        candidate.updated_at = now;
        self.persist(&candidate)?;
        *state = candidate;
        self.events.publish(&state.run_id, RunEvent::system_feed(reason, Severity::High));
        self.events.publish(&state.run_id, RunEvent::PhaseChange {
            phase: Phase::Error,
        });
        self.events.publish(&state.run_id, RunEvent::Complete {
            phase: Phase::Error,
        });
        Ok(())
    }

    /// Persists a state snapshot, retrying up to the configured bound.
    fn persist(&self, state: &RunState) -> Result<(), OrchestratorError> {
        let mut last = None;
        for _ in 0..self.config.max_persist_attempts {
            match self.store.save(state) {
                Ok(()) => return Ok(()),
                Err(err) => last = Some(err),
            }
        }
        Err(OrchestratorError::Persistence(last.unwrap_or_else(|| {
            StoreError::Store("save failed with no reported error".to_string())
        })))
    }

    /// Loads a run or reports it missing.
    fn load_required(&self, run_id: &RunId) -> Result<RunState, OrchestratorError> {
        self.store
            .load(run_id)?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.clone()))
    }

    /// Returns the execution lock for a run.
    fn run_lock(&self, run_id: &RunId) -> Arc<Mutex<()>> {
        let mut guard = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            guard
                .entry(run_id.as_str().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Acquires a run lock, recovering from poisoning.
fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Builds a feed event attributed to a stage actor.
fn feed(actor: ActorId, message: &str, severity: Severity) -> RunEvent {
    RunEvent::NeuralFeed {
        agent: actor.as_str().to_string(),
        message: message.to_string(),
        severity,
        timestamp: Timestamp::now(),
    }
}
