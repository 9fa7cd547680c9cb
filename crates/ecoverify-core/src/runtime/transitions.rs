// crates/ecoverify-core/src/runtime/transitions.rs
// ============================================================================
// Module: EcoVerify Transition Table
// Description: The explicit finite-state transition table for run phases.
// Purpose: Make every legal phase transition a pure, independently testable fact.
// Dependencies: crate::core::state, thiserror
// ============================================================================

//! ## Overview
//! The cyclic workflow is modeled as an explicit transition table over a
//! closed outcome set rather than a graph traversal, so termination and the
//! retry bound are checkable in isolation. Any `(phase, outcome)` pair not
//! listed here is illegal and surfaces as a [`TransitionError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::state::Phase;
use crate::core::state::StageOutcome;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when a transition is not in the table.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The outcome is not legal for the current phase.
    #[error("illegal transition: {outcome:?} from phase {phase:?}")]
    IllegalOutcome {
        /// Phase the run was in.
        phase: Phase,
        /// Outcome a stage reported.
        outcome: StageOutcome,
    },
    /// The run is terminal and accepts no further transitions.
    #[error("run is terminal in phase {0:?}")]
    Terminal(Phase),
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

/// Returns the phase a stage outcome transitions to, per the transition table.
///
/// The retry re-entry (`ComplianceRetry` back to `MonitorDone`) and the
/// resume transitions out of `Interrupted` are orchestrator operations, not
/// stage outcomes, and are therefore not represented here.
///
/// # Errors
///
/// Returns [`TransitionError`] for terminal phases and for any
/// `(phase, outcome)` pair outside the table.
pub const fn next_phase(phase: Phase, outcome: StageOutcome) -> Result<Phase, TransitionError> {
    if phase.is_terminal() {
        return Err(TransitionError::Terminal(phase));
    }
    match (phase, outcome) {
        (Phase::Starting, StageOutcome::EvidenceGathered) => Ok(Phase::MonitorDone),
        (Phase::MonitorDone, StageOutcome::FindingsValid) => Ok(Phase::ComplianceDone),
        (Phase::MonitorDone, StageOutcome::CitationsInvalid) => Ok(Phase::ComplianceRetry),
        (Phase::ComplianceDone, StageOutcome::ProposalReady) => Ok(Phase::SimulateDone),
        (Phase::SimulateDone, StageOutcome::Suspended) => Ok(Phase::Interrupted),
        (Phase::ApprovalGranted, StageOutcome::Settled) => Ok(Phase::Complete),
        (phase, outcome) => Err(TransitionError::IllegalOutcome {
            phase,
            outcome,
        }),
    }
}

/// Returns the phase a resume decision transitions an interrupted run to.
#[must_use]
pub const fn resume_target(approved: bool) -> Phase {
    if approved { Phase::ApprovalGranted } else { Phase::ApprovalDenied }
}
