// crates/ecoverify-stages/src/governor.rs
// ============================================================================
// Module: Governor Stage
// Description: Mandatory approval checkpoint before any state mutation.
// Purpose: Present the proposal for external approval and suspend the run.
// Dependencies: ecoverify-core
// ============================================================================

//! ## Overview
//! The governor stage is the half of the approval checkpoint that runs before
//! suspension: it publishes the governor panel with the full proposal and
//! reports the `Suspended` outcome. The post-suspension half (recording and
//! signing the operator's decision) is the orchestrator's resume operation,
//! which is why this stage produces no trace entry of its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ecoverify_core::ActorId;
use ecoverify_core::RunEvent;
use ecoverify_core::RunState;
use ecoverify_core::Severity;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StateUpdate;
use ecoverify_core::Timestamp;

// ============================================================================
// SECTION: Governor Stage
// ============================================================================

/// Approval-checkpoint stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct GovernorStage;

impl GovernorStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StageExecutor for GovernorStage {
    fn actor(&self) -> ActorId {
        ActorId::Governor
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let proposal = state
            .proposal
            .as_ref()
            .ok_or_else(|| StageFault::Fatal("no proposal recorded before approval".to_string()))?;
        let now = Timestamp::now();

        let compliance_label = state
            .findings
            .as_ref()
            .map_or("pending", |findings| findings.status.as_str());
        let action_summary = format!(
            "Approve remediation for {} anomaly(ies). Estimated monthly saving: ${:.2}. CO2 \
             reduction: {:.1} tons/yr ({:.1}%). Compliance status: {compliance_label}.",
            state.anomalies.len(),
            proposal.monthly_savings,
            proposal.co2_tons_saved_annual,
            proposal.env_reduction_pct
        );

        let panel = RunEvent::GovernorPanel {
            action_summary,
            estimated_roi: proposal.monthly_savings,
            npv_3yr: proposal.npv_3yr,
            payback_months: proposal.payback_months,
            requires_approval: true,
            co2_tons_saved_annual: proposal.co2_tons_saved_annual,
            env_reduction_pct: proposal.env_reduction_pct,
            campus_buildings: proposal.campus_buildings,
        };
        let feed = RunEvent::NeuralFeed {
            agent: ActorId::Governor.as_str().to_string(),
            message: "Awaiting operator approval for state-mutating action.".to_string(),
            severity: Severity::Medium,
            timestamp: now,
        };

        Ok(StageOutput {
            outcome: StageOutcome::Suspended,
            update: StateUpdate::default(),
            decision: None,
            events: vec![panel, feed],
        })
    }
}
