// crates/ecoverify-core/src/interfaces/mod.rs
// ============================================================================
// Module: EcoVerify Interfaces
// Description: Backend-agnostic contracts for persistence, events, and stages.
// Purpose: Define the seams the orchestrator integrates through.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the orchestration core integrates with storage,
//! event delivery, and stage execution without embedding backend details.
//! Implementations must fail closed on missing or invalid data: a checkpoint
//! that cannot be verified is an error, never a silently degraded load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::RunEvent;
use crate::core::RunId;
use crate::core::RunState;
use crate::core::StageOutcome;
use crate::core::StateUpdate;
use crate::core::SubjectId;
use crate::core::identifiers::ActorId;

// ============================================================================
// SECTION: Checkpoint Store
// ============================================================================

/// Checkpoint store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("checkpoint store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("checkpoint store corruption: {0}")]
    Corrupt(String),
    /// Stored data is invalid.
    #[error("checkpoint store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("checkpoint store error: {0}")]
    Store(String),
}

/// Durable persistence for run state.
///
/// A transition is not considered to have happened until `save` succeeds; the
/// orchestrator never advances its view of a run past an unpersisted state.
pub trait CheckpointStore: Send + Sync {
    /// Atomically overwrites the persisted state for the run. Last write wins;
    /// a concurrent `load` never observes a partially written record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    fn save(&self, state: &RunState) -> Result<(), StoreError>;

    /// Loads the persisted state for a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading or integrity verification fails.
    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError>;

    /// Lists runs whose phase is not terminal, for restart recovery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_active(&self) -> Result<Vec<RunId>, StoreError>;

    /// Reports store readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Event Delivery
// ============================================================================

/// Publish side of the per-run event fan-out.
///
/// Delivery is best-effort and ordered per run; a slow or absent subscriber
/// never blocks the publisher.
pub trait EventSink: Send + Sync {
    /// Publishes one event for a run.
    fn publish(&self, run_id: &RunId, event: RunEvent);
}

/// Full event channel: publish plus subscription.
pub trait EventChannel: EventSink {
    /// Lazy, ordered sequence of events for one run.
    type Stream;

    /// Opens a subscription for a run. Events published before the
    /// subscription are not replayed.
    fn subscribe(&self, run_id: &RunId) -> Self::Stream;
}

// ============================================================================
// SECTION: Stage Execution
// ============================================================================

/// Faults reported by stage executors.
///
/// # Invariants
/// - `Transient` faults are retried up to a configured bound; `Fatal` faults
///   terminate the run immediately.
#[derive(Debug, Error)]
pub enum StageFault {
    /// External capability temporarily unavailable; same stage will be retried.
    #[error("transient stage fault: {0}")]
    Transient(String),
    /// Unrecoverable stage failure.
    #[error("fatal stage fault: {0}")]
    Fatal(String),
}

/// Result of one stage execution.
///
/// # Invariants
/// - `decision` is `Some` only for outcomes that count as stage completions;
///   the orchestrator signs it and appends the trace entry.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Outcome driving the transition table.
    pub outcome: StageOutcome,
    /// Partial state mutation to apply.
    pub update: StateUpdate,
    /// Signable decision payload for completing outcomes.
    pub decision: Option<Value>,
    /// Events to publish after the transition persists.
    pub events: Vec<RunEvent>,
}

/// One named processing stage, pure over the run state and its capabilities.
///
/// Executors read the current state and return a result plus the next
/// transition; they never persist, publish, or sign themselves.
pub trait StageExecutor: Send + Sync {
    /// Actor identity used to sign this stage's decisions.
    fn actor(&self) -> ActorId;

    /// Executes the stage against the current run state.
    ///
    /// # Errors
    ///
    /// Returns [`StageFault`] when the stage cannot produce a result.
    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault>;
}

// ============================================================================
// SECTION: Stimulus Injection
// ============================================================================

/// Seeds Monitor evidence for a subject from an external source.
pub trait StimulusInjector: Send + Sync {
    /// Injects an anomaly stimulus of the given severity for a subject.
    fn inject(&self, subject: &SubjectId, severity: f64);
}
