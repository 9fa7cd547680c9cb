// crates/ecoverify-core/src/runtime/registry.rs
// ============================================================================
// Module: EcoVerify Run Registry
// Description: Thin boundary mapping external requests onto orchestrator ops.
// Purpose: Validate call shape and route; no business logic lives here.
// Dependencies: crate::{core, interfaces, runtime::orchestrator}
// ============================================================================

//! ## Overview
//! The run registry is the boundary toward the excluded HTTP/CLI layer. Each
//! call maps 1:1 onto an orchestrator operation; the registry only validates
//! call shape and projects run state into the status and trace responses the
//! external layer exposes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::core::Phase;
use crate::core::RunId;
use crate::core::SubjectId;
use crate::interfaces::CheckpointStore;
use crate::interfaces::EventChannel;
use crate::interfaces::StimulusInjector;
use crate::runtime::orchestrator::Orchestrator;
use crate::runtime::orchestrator::OrchestratorError;
use crate::runtime::orchestrator::VerifiedTrace;

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Response to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartResponse {
    /// Created run identifier.
    pub run_id: RunId,
    /// Phase after the start operation.
    pub status: Phase,
}

/// Response to a resume request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeResponse {
    /// Resumed run identifier.
    pub run_id: RunId,
    /// Phase after the resume operation.
    pub status: Phase,
}

/// Status projection for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Current phase.
    pub phase: Phase,
    /// True while the run can still make progress without external input.
    pub is_running: bool,
    /// True while the run awaits an approval decision.
    pub is_interrupted: bool,
    /// Number of anomalies from the latest Monitor pass.
    pub anomaly_count: u32,
    /// Compliance status label (`pending` before Compliance completes).
    pub compliance_status: String,
    /// Projected monthly savings (zero before Simulate completes).
    pub monthly_savings: f64,
    /// Latest composite risk score in `[0, 1]` (zero before Finalize).
    pub risk_score: f64,
    /// Number of recorded settlements.
    pub settlement_count: u32,
    /// Facility audit status label (`pending` before Finalize).
    pub fhir_audit_status: String,
}

/// Full decision trace with recomputed verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Verified trace entries in append order.
    pub traces: Vec<VerifiedTrace>,
    /// Number of entries.
    pub count: u32,
}

// ============================================================================
// SECTION: Run Registry
// ============================================================================

/// Boundary surface mapping external requests onto orchestrator operations.
///
/// # Invariants
/// - Performs no business logic; every mutation goes through the
///   orchestrator, every read through the checkpoint store.
pub struct RunRegistry<S, E> {
    /// The orchestrator all operations route to.
    orchestrator: Arc<Orchestrator<S, E>>,
    /// Stimulus injection seam for Monitor evidence.
    injector: Arc<dyn StimulusInjector>,
}

impl<S, E> RunRegistry<S, E>
where
    S: CheckpointStore,
    E: EventChannel,
{
    /// Creates a registry over an orchestrator and a stimulus injector.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator<S, E>>, injector: Arc<dyn StimulusInjector>) -> Self {
        Self {
            orchestrator,
            injector,
        }
    }

    /// Starts a new run for a subject.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when creation or persistence fails.
    pub fn start(&self, subject: impl Into<SubjectId>) -> Result<StartResponse, OrchestratorError> {
        let state = self.orchestrator.start(subject.into())?;
        Ok(StartResponse {
            run_id: state.run_id,
            status: state.phase,
        })
    }

    /// Drives a run to its next suspension point or terminal phase.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the run is missing or a transition
    /// fails.
    pub fn drive(&self, run_id: &RunId) -> Result<Phase, OrchestratorError> {
        self.orchestrator.run_until_suspended(run_id)
    }

    /// Applies an approval decision to an interrupted run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInterrupted`] or
    /// [`OrchestratorError::AdjustmentOutOfRange`] on protocol misuse; no
    /// state is mutated in either case.
    pub fn resume(
        &self,
        run_id: &RunId,
        approved: bool,
        adjustment: f64,
    ) -> Result<ResumeResponse, OrchestratorError> {
        let status = self.orchestrator.resume(run_id, approved, adjustment)?;
        Ok(ResumeResponse {
            run_id: run_id.clone(),
            status,
        })
    }

    /// Seeds Monitor evidence for a subject from an external source.
    pub fn inject_stimulus(&self, subject: &SubjectId, severity: f64) {
        self.injector.inject(subject, severity);
    }

    /// Returns the status projection for a run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunNotFound`] when the run is unknown.
    pub fn status(&self, run_id: &RunId) -> Result<StatusReport, OrchestratorError> {
        let state = self.orchestrator.snapshot(run_id)?;
        let anomaly_count = u32::try_from(state.anomalies.len()).unwrap_or(u32::MAX);
        let settlement_count = u32::try_from(state.settlements.len()).unwrap_or(u32::MAX);
        Ok(StatusReport {
            run_id: state.run_id.clone(),
            phase: state.phase,
            is_running: !state.phase.is_terminal()
                && state.phase != Phase::Interrupted
                && state.phase != Phase::Idle,
            is_interrupted: state.phase == Phase::Interrupted,
            anomaly_count,
            compliance_status: state
                .findings
                .as_ref()
                .map_or("pending", |findings| findings.status.as_str())
                .to_string(),
            monthly_savings: state
                .proposal
                .as_ref()
                .map_or(0.0, |proposal| proposal.monthly_savings),
            risk_score: state.risk_scores.last().map_or(0.0, |score| score.score),
            settlement_count,
            fhir_audit_status: state
                .audit
                .as_ref()
                .map_or("pending", |audit| audit.status.as_str())
                .to_string(),
        })
    }

    /// Returns the full decision trace with verification recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunNotFound`] when the run is unknown.
    pub fn traces(&self, run_id: &RunId) -> Result<TraceReport, OrchestratorError> {
        let traces = self.orchestrator.traces(run_id)?;
        let count = u32::try_from(traces.len()).unwrap_or(u32::MAX);
        Ok(TraceReport {
            run_id: run_id.clone(),
            traces,
            count,
        })
    }

    /// Opens an event subscription for a run.
    pub fn subscribe_events(&self, run_id: &RunId) -> E::Stream {
        self.orchestrator.events().subscribe(run_id)
    }

    /// Cancels a non-terminal run with a reason.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunTerminal`] when the run already
    /// terminated.
    pub fn cancel(&self, run_id: &RunId, reason: &str) -> Result<Phase, OrchestratorError> {
        self.orchestrator.cancel(run_id, reason)
    }

    /// Recovers in-flight runs after a restart.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Persistence`] when the active-run listing
    /// fails.
    pub fn recover_all(&self) -> Result<Vec<RunId>, OrchestratorError> {
        self.orchestrator.recover()
    }
}
