// crates/ecoverify-stages/src/finalize.rs
// ============================================================================
// Module: Finalize Stage
// Description: Settlement, risk scoring, facility audit, and proof graph.
// Purpose: Settle the approved outcome and publish the terminal artifacts.
// Dependencies: ecoverify-core, crate::{capabilities, risk}
// ============================================================================

//! ## Overview
//! Finalize runs only after approval is granted. It scales the proposal by
//! the operator's adjustment factor, settles the service fee on the ledger,
//! computes the composite risk score and the facility energy audit, and
//! renders the proof graph from the signed decision trace accumulated so far.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ecoverify_core::ActorId;
use ecoverify_core::AuditReport;
use ecoverify_core::AuditStatus;
use ecoverify_core::DecisionTraceEntry;
use ecoverify_core::ExecutionSummary;
use ecoverify_core::RunEvent;
use ecoverify_core::RunState;
use ecoverify_core::Severity;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StateUpdate;
use ecoverify_core::Timestamp;
use serde_json::Value;
use serde_json::json;

use crate::capabilities::CapabilityError;
use crate::capabilities::SettlementLedger;
use crate::capabilities::SettlementRequest;
use crate::risk::compute_risk_score;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Service fee as a fraction of the adjusted monthly savings.
const SERVICE_FEE_RATE: f64 = 0.001;
/// Efficiency score at or above which a facility is within benchmark.
const BENCHMARK_FLOOR: f64 = 60.0;

// ============================================================================
// SECTION: Finalize Stage
// ============================================================================

/// Settlement and audit stage.
pub struct FinalizeStage {
    /// Settlement capability handle.
    ledger: Arc<dyn SettlementLedger>,
}

impl FinalizeStage {
    /// Creates the stage over a settlement ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn SettlementLedger>) -> Self {
        Self {
            ledger,
        }
    }
}

impl StageExecutor for FinalizeStage {
    fn actor(&self) -> ActorId {
        ActorId::Finalize
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let approval = state
            .approval
            .as_ref()
            .filter(|approval| approval.granted)
            .ok_or_else(|| StageFault::Fatal("finalize invoked without granted approval".to_string()))?;
        let proposal = state
            .proposal
            .as_ref()
            .ok_or_else(|| StageFault::Fatal("finalize invoked without a proposal".to_string()))?;
        let now = Timestamp::now();

        // The operator's adjustment scales the estimated outcome here, at
        // execution time, leaving the recorded proposal untouched.
        let adjusted_monthly = proposal.monthly_savings * approval.adjustment_factor;
        let fee = round4(adjusted_monthly * SERVICE_FEE_RATE);

        let mut settlements = Vec::new();
        let mut events = Vec::new();

        events.push(RunEvent::ProofGraph {
            mermaid: render_proof_graph(&state.decision_trace),
        });
        events.push(RunEvent::NeuralFeed {
            agent: "system".to_string(),
            message: format!(
                "Loop complete: {} anomaly(ies) resolved, ${adjusted_monthly:.0}/mo projected \
                 saving.",
                state.anomalies.len()
            ),
            severity: Severity::Low,
            timestamp: now,
        });

        if fee > 0.0 {
            let receipt = self
                .ledger
                .settle(&SettlementRequest {
                    from_actor: ActorId::Simulate,
                    to_actor: ActorId::Governor,
                    amount: fee,
                    memo: format!(
                        "Service fee for run {}: {} anomaly(ies) resolved",
                        state.run_id,
                        state.anomalies.len()
                    ),
                })
                .map_err(fault)?;
            events.push(RunEvent::SettlementUpdate {
                settlement: receipt.clone(),
                message: format!(
                    "Settlement: ${:.4} ({}) on {}",
                    receipt.amount,
                    receipt.status.as_str(),
                    receipt.network
                ),
                severity: Severity::Low,
            });
            settlements.push(receipt);
        }

        let risk = compute_risk_score(
            &state.anomalies,
            state.findings.as_ref().map(|findings| findings.status),
            adjusted_monthly,
        );
        events.push(RunEvent::RiskAlert {
            risk_score: risk.clone(),
            message: format!("Risk score: {:.2} ({})", risk.score, risk.category.as_str()),
            severity: risk.severity,
        });
        events.push(RunEvent::NeuralFeed {
            agent: "system".to_string(),
            message: risk.recommendation.clone(),
            severity: risk.severity,
            timestamp: now,
        });

        let audit = facility_audit(state);
        let summary = ExecutionSummary {
            anomalies_detected: u32::try_from(state.anomalies.len()).unwrap_or(u32::MAX),
            compliance_status: state
                .findings
                .as_ref()
                .map_or("pending", |findings| findings.status.as_str())
                .to_string(),
            monthly_savings: round2(adjusted_monthly),
            settlement_count: u32::try_from(state.settlements.len() + settlements.len())
                .unwrap_or(u32::MAX),
            risk_score: risk.score,
            completed_at: now,
        };
        events.push(RunEvent::ExecutionComplete {
            summary,
        });

        let decision = json!({
            "action": "final_settlement",
            "settlement_amount": fee,
            "adjusted_monthly_savings": round2(adjusted_monthly),
            "adjustment_factor": approval.adjustment_factor,
            "risk_score": risk.score,
            "tx_id": settlements.first().map(|record| record.tx_id.clone()),
        });

        Ok(StageOutput {
            outcome: StageOutcome::Settled,
            update: StateUpdate {
                settlements,
                risk_scores: vec![risk],
                audit: Some(audit),
                ..StateUpdate::default()
            },
            decision: Some(decision),
            events,
        })
    }
}

// ============================================================================
// SECTION: Facility Audit
// ============================================================================

/// Computes the facility energy audit from retained telemetry.
fn facility_audit(state: &RunState) -> AuditReport {
    state.telemetry.as_ref().map_or_else(
        || AuditReport {
            facility_id: state.subject.clone(),
            efficiency_score: 0.0,
            benchmark_percentile: 0,
            status: AuditStatus::Pending,
        },
        |telemetry| {
            let summary = &telemetry.energy.summary;
            let overshoot_pct =
                (summary.peak - summary.average) / summary.average.max(1.0) * 100.0;
            let efficiency_score = (100.0 - overshoot_pct).clamp(0.0, 100.0);
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "Value is clamped to [0, 99] before the cast."
            )]
            let benchmark_percentile = (efficiency_score * 0.9).round().clamp(0.0, 99.0) as u32;
            let status = if efficiency_score >= BENCHMARK_FLOOR {
                AuditStatus::WithinBenchmark
            } else {
                AuditStatus::ReviewRequired
            };
            AuditReport {
                facility_id: state.subject.clone(),
                efficiency_score: round1(efficiency_score),
                benchmark_percentile,
                status,
            }
        },
    )
}

// ============================================================================
// SECTION: Proof Graph
// ============================================================================

/// Renders a Mermaid flowchart from the signed decision trace.
#[must_use]
pub fn render_proof_graph(entries: &[DecisionTraceEntry]) -> String {
    let mut lines = vec!["graph TD".to_string(), "    START((start))".to_string()];
    let mut prev = "START".to_string();
    for (index, entry) in entries.iter().enumerate() {
        let node = format!("{}_{index}", entry.actor_id);
        let action =
            entry.decision.get("action").and_then(Value::as_str).unwrap_or("decision");
        let sig: String = entry.payload_hash.as_str().chars().take(8).collect();
        lines.push(format!("    {node}[\"{}: {action}\"]", entry.actor_id));
        lines.push(format!("    {prev} -->|sig:{sig}| {node}"));
        prev = node;
    }
    lines.push(format!("    {prev} --> END((complete))"));
    lines.join("\n")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps capability errors onto stage faults.
fn fault(err: CapabilityError) -> StageFault {
    match err {
        CapabilityError::Unavailable(message) => StageFault::Transient(message),
        CapabilityError::Rejected(message) => StageFault::Fatal(message),
    }
}

/// Rounds to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rounds to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds to four decimal places.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
