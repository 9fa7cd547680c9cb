// crates/ecoverify-stages/src/lib.rs
// ============================================================================
// Module: EcoVerify Stages Library
// Description: The five stage executors and their capability providers.
// Purpose: Implement pipeline semantics behind the core's executor seam.
// Dependencies: ecoverify-core
// ============================================================================

//! ## Overview
//! Each stage is a pure function over the current run state and a set of
//! external capability handles. How a capability computes its answer
//! (simulation, retrieval, a remote service) is invisible to the stages; the
//! built-in implementations here simulate a facility so the pipeline runs
//! end-to-end in-process.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capabilities;
pub mod compliance;
pub mod finalize;
pub mod governor;
pub mod monitor;
pub mod regulatory;
pub mod risk;
pub mod settlement;
pub mod simulate;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

use std::sync::Arc;

use ecoverify_core::StageSet;

pub use capabilities::Article;
pub use capabilities::CapabilityError;
pub use capabilities::ComplianceAssessment;
pub use capabilities::RegulatoryRegistry;
pub use capabilities::SettlementLedger;
pub use capabilities::SettlementRequest;
pub use capabilities::TelemetryProbe;
pub use compliance::ComplianceStage;
pub use finalize::FinalizeStage;
pub use finalize::render_proof_graph;
pub use governor::GovernorStage;
pub use monitor::MonitorStage;
pub use regulatory::BuiltinRegulatory;
pub use risk::compute_risk_score;
pub use settlement::InMemoryLedger;
pub use simulate::SimulateStage;
pub use simulate::compute_proposal;
pub use telemetry::SimulatedTelemetry;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Assembles the standard five-stage set over the provided capabilities.
#[must_use]
pub fn standard_stage_set(
    probe: Arc<dyn TelemetryProbe>,
    regulatory: Arc<dyn RegulatoryRegistry>,
    ledger: Arc<dyn SettlementLedger>,
) -> StageSet {
    StageSet::new(
        Box::new(MonitorStage::new(probe)),
        Box::new(ComplianceStage::new(regulatory)),
        Box::new(SimulateStage::new()),
        Box::new(GovernorStage::new()),
        Box::new(FinalizeStage::new(ledger)),
    )
}
