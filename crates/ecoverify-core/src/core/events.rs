// crates/ecoverify-core/src/core/events.rs
// ============================================================================
// Module: EcoVerify Run Events
// Description: Closed, tagged event set published per run.
// Purpose: Give subscribers a statically checkable contract per event name.
// Dependencies: crate::core::{state, time}, serde
// ============================================================================

//! ## Overview
//! Events are a live-notification convenience: delivery is best-effort and
//! ordered per run, with no replay. The run state is the durable record. Each
//! variant carries a fixed required-field payload so producers and consumers
//! are checked at compile time rather than agreeing on loose JSON blobs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::state::Phase;
use crate::core::state::RiskScore;
use crate::core::state::SettlementRecord;
use crate::core::state::Severity;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Execution Summary
// ============================================================================

/// Terminal summary published when the pipeline finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Number of anomalies detected.
    pub anomalies_detected: u32,
    /// Compliance status label.
    pub compliance_status: String,
    /// Adjusted monthly savings projection.
    pub monthly_savings: f64,
    /// Number of settlements recorded.
    pub settlement_count: u32,
    /// Final composite risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Completion timestamp.
    pub completed_at: Timestamp,
}

// ============================================================================
// SECTION: Run Events
// ============================================================================

/// One event published for a run.
///
/// # Invariants
/// - The set is closed; the `type` tag and field names are stable wire
///   contracts for external subscribers.
/// - `Complete` is always the last event a subscriber observes for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Phase transition notification.
    PhaseChange {
        /// New phase.
        phase: Phase,
    },
    /// Human-readable log line attributable to a named actor.
    NeuralFeed {
        /// Actor label (a stage actor or `system`).
        agent: String,
        /// Feed message.
        message: String,
        /// Message severity.
        severity: Severity,
        /// Emission timestamp.
        timestamp: Timestamp,
    },
    /// Full proposal presented for external approval on entering interruption.
    GovernorPanel {
        /// Human-readable action summary.
        action_summary: String,
        /// Estimated monthly return.
        estimated_roi: f64,
        /// Net present value over three years.
        npv_3yr: f64,
        /// Months to pay back the remediation cost.
        payback_months: f64,
        /// Whether external approval is required (always true).
        requires_approval: bool,
        /// Projected CO2 tons saved annually.
        co2_tons_saved_annual: f64,
        /// Projected environmental reduction percentage.
        env_reduction_pct: f64,
        /// Number of campus buildings covered.
        campus_buildings: u32,
    },
    /// Redundant signal that approval is required.
    Interrupt {},
    /// Settlement recorded at Finalize.
    SettlementUpdate {
        /// Settlement record.
        settlement: SettlementRecord,
        /// Feed message.
        message: String,
        /// Message severity.
        severity: Severity,
    },
    /// Risk assessment recorded at Finalize.
    RiskAlert {
        /// Risk assessment.
        risk_score: RiskScore,
        /// Feed message.
        message: String,
        /// Message severity.
        severity: Severity,
    },
    /// Textual reasoning-chain artifact (Mermaid definition).
    ProofGraph {
        /// Mermaid graph definition.
        mermaid: String,
    },
    /// Pipeline summary emitted by Finalize.
    ExecutionComplete {
        /// Execution summary.
        summary: ExecutionSummary,
    },
    /// Terminal signal; closes the run's event channel.
    Complete {
        /// Terminal phase.
        phase: Phase,
    },
}

impl RunEvent {
    /// Builds a feed event attributed to the system rather than a stage actor.
    #[must_use]
    pub fn system_feed(message: impl Into<String>, severity: Severity) -> Self {
        Self::NeuralFeed {
            agent: "system".to_string(),
            message: message.into(),
            severity,
            timestamp: Timestamp::now(),
        }
    }

    /// Returns true when the event is the terminal signal for its run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}
