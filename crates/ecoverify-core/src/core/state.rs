// crates/ecoverify-core/src/core/state.rs
// ============================================================================
// Module: EcoVerify Run State
// Description: Phases, evidence, findings, proposals, approvals, and settlements.
// Purpose: Capture deterministic run evolution for checkpointing and audit.
// Dependencies: crate::core::{hashing, identifiers, signing, time}, serde
// ============================================================================

//! ## Overview
//! Run state is the unit of durable persistence for one investigation. All
//! collections are append-only and the phase moves only along the transition
//! table in [`crate::runtime::next_phase`]. State must be treated as untrusted
//! on load; the checkpoint store verifies snapshot integrity before handing a
//! `RunState` back to the orchestrator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SubjectId;
use crate::core::signing::DecisionTraceEntry;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Phase
// ============================================================================

/// Run lifecycle phase.
///
/// # Invariants
/// - Transitions occur only along the orchestrator transition table.
/// - `Complete` and `Error` are terminal; a terminal run is immutable.
/// - Variants are stable for serialization and store filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Run record exists but has not been started.
    Idle,
    /// Run has started; Monitor has not yet reported.
    Starting,
    /// Monitor completed and evidence is recorded.
    MonitorDone,
    /// Compliance completed with valid citations.
    ComplianceDone,
    /// Compliance cited unverifiable evidence; retry pending.
    ComplianceRetry,
    /// Simulate completed and a proposal is recorded.
    SimulateDone,
    /// Suspended awaiting an external approval decision.
    Interrupted,
    /// External approval granted; Finalize pending.
    ApprovalGranted,
    /// External approval denied; run will complete without settlement.
    ApprovalDenied,
    /// Terminal: pipeline finished.
    Complete,
    /// Terminal: pipeline aborted.
    Error,
}

impl Phase {
    /// Returns true when the phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns the stable wire label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::MonitorDone => "monitor_done",
            Self::ComplianceDone => "compliance_done",
            Self::ComplianceRetry => "compliance_retry",
            Self::SimulateDone => "simulate_done",
            Self::Interrupted => "interrupted",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalDenied => "approval_denied",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Severity level shared by anomalies and feed events.
///
/// # Invariants
/// - Variants are stable for serialization; ordering is Low < Medium < High.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Needs attention.
    Medium,
    /// Urgent.
    High,
}

impl Severity {
    /// Returns the stable wire label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// One telemetry reading sampled by a probe.
///
/// # Invariants
/// - `anomaly_score` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Sample timestamp.
    pub sampled_at: Timestamp,
    /// Metric value (kWh for energy, gallons for water).
    pub value: f64,
    /// Anomaly score assigned by the probe.
    pub anomaly_score: f64,
}

/// Summary statistics over a telemetry series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Average reading value.
    pub average: f64,
    /// Peak reading value.
    pub peak: f64,
    /// Number of readings scored as anomalous.
    pub anomaly_count: u32,
    /// Number of readings sampled.
    pub samples: u32,
}

/// Telemetry series for one metric of one subject.
///
/// # Invariants
/// - `summary` is derived from `readings` at capture time and never recomputed
///   in place; citation hashes cover the whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Logical source identifier (e.g. `bms:energy:HQ-01`).
    pub source_id: String,
    /// Metric unit label.
    pub unit: String,
    /// Sampled readings, oldest first.
    pub readings: Vec<TelemetryReading>,
    /// Summary statistics.
    pub summary: TelemetrySummary,
}

/// Energy and water telemetry retained on the run for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityTelemetry {
    /// Energy consumption series.
    pub energy: TelemetrySnapshot,
    /// Water consumption series.
    pub water: TelemetrySnapshot,
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Citation proving a data source was consulted before acting.
///
/// # Invariants
/// - `data_hash` is the canonical hash of the cited payload; Compliance
///   recomputes it against the retained telemetry before accepting findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Logical source identifier.
    pub source_id: String,
    /// Canonical hash of the cited payload.
    pub data_hash: HashDigest,
    /// Human-readable excerpt for audit display.
    pub snippet: String,
    /// Capture timestamp.
    pub captured_at: Timestamp,
}

// ============================================================================
// SECTION: Anomalies
// ============================================================================

/// Anomaly classification.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Energy consumption spike.
    EnergySpike,
    /// Water consumption spike.
    WaterSpike,
}

impl AnomalyKind {
    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnergySpike => "energy_spike",
            Self::WaterSpike => "water_spike",
        }
    }
}

/// One anomaly detected by Monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Anomaly classification.
    pub kind: AnomalyKind,
    /// Subject the anomaly belongs to.
    pub subject: SubjectId,
    /// Severity assigned at detection.
    pub severity: Severity,
    /// Human-readable metric description (e.g. `+23.4% above average`).
    pub metric: String,
    /// Peak reading during the anomalous window.
    pub peak: f64,
    /// Average reading over the sampled window.
    pub average: f64,
    /// Detection timestamp.
    pub detected_at: Timestamp,
}

// ============================================================================
// SECTION: Compliance Findings
// ============================================================================

/// Overall compliance verdict.
///
/// # Invariants
/// - Variants are stable for serialization and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    /// All findings compliant.
    Compliant,
    /// At least one finding non-compliant.
    NonCompliant,
}

impl ComplianceStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
        }
    }
}

/// Compliance evaluation of one anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    /// The evaluated anomaly.
    pub anomaly: Anomaly,
    /// Whether the contemplated remediation is compliant.
    pub compliant: bool,
    /// Whether human oversight is required before execution.
    pub requires_oversight: bool,
    /// Regulatory article sections referenced by the evaluation.
    pub articles_referenced: Vec<String>,
}

/// Result produced by the Compliance stage.
///
/// # Invariants
/// - Present on the run only after Compliance completes with valid citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceFindings {
    /// Overall verdict.
    pub status: ComplianceStatus,
    /// Whether any finding requires human oversight.
    pub requires_oversight: bool,
    /// Number of anomalies evaluated.
    pub evaluated: u32,
    /// Per-anomaly findings.
    pub findings: Vec<AnomalyFinding>,
    /// Narrative reasoning recorded for audit.
    pub reasoning: String,
    /// Evaluation timestamp.
    pub evaluated_at: Timestamp,
}

// ============================================================================
// SECTION: Remediation Proposal
// ============================================================================

/// Per-anomaly economics line in a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDetail {
    /// Anomaly the line refers to.
    pub kind: AnomalyKind,
    /// Projected monthly saving for this anomaly.
    pub monthly_saving: f64,
    /// Projected CO2 tons saved per month for this anomaly.
    pub co2_tons_saved: f64,
}

/// Remediation proposal produced by the Simulate stage.
///
/// # Invariants
/// - Monetary fields are pre-adjustment; the approval `adjustment_factor`
///   scales outcomes at Finalize, never retroactively here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Projected monthly savings.
    pub monthly_savings: f64,
    /// Projected annual savings.
    pub annual_savings: f64,
    /// Net present value over three years.
    pub npv_3yr: f64,
    /// Months to pay back the remediation cost.
    pub payback_months: f64,
    /// Adjustment factor applied when the proposal was computed.
    pub adjustment_factor: f64,
    /// Projected CO2 tons saved annually.
    pub co2_tons_saved_annual: f64,
    /// Projected environmental reduction percentage.
    pub env_reduction_pct: f64,
    /// Number of campus buildings the projection covers.
    pub campus_buildings: u32,
    /// Per-anomaly detail lines.
    pub details: Vec<ProposalDetail>,
    /// Computation timestamp.
    pub computed_at: Timestamp,
}

// ============================================================================
// SECTION: Approval
// ============================================================================

/// External approval decision applied while the run is interrupted.
///
/// # Invariants
/// - Non-null on the run if and only if the phase has passed `Interrupted`.
/// - `adjustment_factor` is within the configured bounds at acceptance time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Whether the proposal was approved.
    pub granted: bool,
    /// Factor scaling the proposal's estimated outcome.
    pub adjustment_factor: f64,
    /// Decision timestamp.
    pub decided_at: Timestamp,
}

// ============================================================================
// SECTION: Settlement
// ============================================================================

/// Settlement confirmation status.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Settlement confirmed by the ledger.
    Confirmed,
    /// Settlement rejected (e.g. insufficient balance).
    Failed,
}

impl SettlementStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// Recorded outcome of a value transfer executed at Finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Ledger transaction identifier.
    pub tx_id: String,
    /// Paying actor.
    pub from_actor: ActorId,
    /// Receiving actor.
    pub to_actor: ActorId,
    /// Transfer amount.
    pub amount: f64,
    /// Ledger network label.
    pub network: String,
    /// Confirmation status.
    pub status: SettlementStatus,
    /// Settlement memo.
    pub memo: String,
    /// Settlement timestamp.
    pub timestamp: Timestamp,
}

// ============================================================================
// SECTION: Risk
// ============================================================================

/// Risk category derived from the composite score.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    /// Within acceptable thresholds.
    Nominal,
    /// Monitoring escalated.
    Elevated,
    /// Immediate action required.
    Critical,
}

impl RiskCategory {
    /// Returns the stable wire label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Elevated => "elevated",
            Self::Critical => "critical",
        }
    }
}

/// One weighted factor contributing to a risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Factor name.
    pub name: String,
    /// Factor sub-score in `[0, 1]`.
    pub score: f64,
    /// Blend weight.
    pub weight: f64,
}

/// Composite risk assessment recorded at Finalize.
///
/// # Invariants
/// - `score` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Composite score in `[0, 1]`.
    pub score: f64,
    /// Category derived from the score.
    pub category: RiskCategory,
    /// Severity mapped from the category for feed display.
    pub severity: Severity,
    /// Scoring source label.
    pub source: String,
    /// Weighted contributing factors.
    pub factors: Vec<RiskFactor>,
    /// Operator-facing recommendation.
    pub recommendation: String,
}

// ============================================================================
// SECTION: Facility Audit
// ============================================================================

/// Facility audit verdict.
///
/// # Invariants
/// - Variants are stable for serialization and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Audit has not run yet.
    Pending,
    /// Efficiency within the benchmark band.
    WithinBenchmark,
    /// Efficiency below benchmark; review required.
    ReviewRequired,
}

impl AuditStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WithinBenchmark => "within_benchmark",
            Self::ReviewRequired => "review_required",
        }
    }
}

/// Facility energy audit computed at Finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Audited facility.
    pub facility_id: SubjectId,
    /// Efficiency score in `[0, 100]`.
    pub efficiency_score: f64,
    /// Benchmark percentile in `[0, 100]`.
    pub benchmark_percentile: u32,
    /// Audit verdict.
    pub status: AuditStatus,
}

// ============================================================================
// SECTION: Stage Outcome
// ============================================================================

/// Outcome reported by a stage executor, driving the transition table.
///
/// # Invariants
/// - The set is closed; every legal phase transition maps from exactly one
///   `(phase, outcome)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Monitor returned evidence.
    EvidenceGathered,
    /// Compliance returned findings with valid citations.
    FindingsValid,
    /// Compliance cited unverifiable evidence.
    CitationsInvalid,
    /// Simulate returned a proposal.
    ProposalReady,
    /// Approval checkpoint reached; suspend pending resume.
    Suspended,
    /// Finalize settled and signed.
    Settled,
}

// ============================================================================
// SECTION: State Update
// ============================================================================

/// Partial state mutation returned by a stage executor.
///
/// # Invariants
/// - Vectors are appended to the run; options replace only when `Some`.
/// - Stage executors never mutate `RunState` directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Telemetry to retain on the run.
    pub telemetry: Option<FacilityTelemetry>,
    /// Evidence citations to append.
    pub evidence: Vec<EvidenceRecord>,
    /// Detected anomalies (replaces the previous detection pass).
    pub anomalies: Option<Vec<Anomaly>>,
    /// Compliance findings to record.
    pub findings: Option<ComplianceFindings>,
    /// Remediation proposal to record.
    pub proposal: Option<Proposal>,
    /// Settlements to append.
    pub settlements: Vec<SettlementRecord>,
    /// Risk scores to append.
    pub risk_scores: Vec<RiskScore>,
    /// Facility audit to record.
    pub audit: Option<AuditReport>,
    /// Error-log lines to append.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Run State
// ============================================================================

/// Durable state for one investigation run.
///
/// # Invariants
/// - `decision_trace` length equals the number of stage completions; entries
///   are never reordered or retracted.
/// - `approval` is non-null if and only if the phase has passed `Interrupted`.
/// - `retry_count` never exceeds the configured maximum; exhaustion forces
///   the `Error` phase.
/// - Mutated exclusively by the orchestrator; immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier.
    pub run_id: RunId,
    /// Monitored subject.
    pub subject: SubjectId,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Telemetry retained for audit, once Monitor has run.
    pub telemetry: Option<FacilityTelemetry>,
    /// Evidence citation log, append-only.
    pub evidence: Vec<EvidenceRecord>,
    /// Anomalies from the latest Monitor pass.
    pub anomalies: Vec<Anomaly>,
    /// Compliance findings, once recorded.
    pub findings: Option<ComplianceFindings>,
    /// Remediation proposal, once recorded.
    pub proposal: Option<Proposal>,
    /// External approval decision, set only by resume.
    pub approval: Option<ApprovalDecision>,
    /// Settlement log, append-only.
    pub settlements: Vec<SettlementRecord>,
    /// Risk score log, append-only.
    pub risk_scores: Vec<RiskScore>,
    /// Facility audit, once recorded.
    pub audit: Option<AuditReport>,
    /// Signed decision trace, append-only.
    pub decision_trace: Vec<DecisionTraceEntry>,
    /// Compliance self-correction retries consumed.
    pub retry_count: u32,
    /// Transient stage-fault retries consumed.
    pub transient_retries: u32,
    /// Error log, append-only.
    pub error_log: Vec<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

impl RunState {
    /// Creates a fresh run record in the `Idle` phase.
    #[must_use]
    pub fn new(run_id: RunId, subject: SubjectId, created_at: Timestamp) -> Self {
        Self {
            run_id,
            subject,
            phase: Phase::Idle,
            telemetry: None,
            evidence: Vec::new(),
            anomalies: Vec::new(),
            findings: None,
            proposal: None,
            approval: None,
            settlements: Vec::new(),
            risk_scores: Vec::new(),
            audit: None,
            decision_trace: Vec::new(),
            retry_count: 0,
            transient_retries: 0,
            error_log: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Applies a stage update, appending collections and replacing options.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(telemetry) = update.telemetry {
            self.telemetry = Some(telemetry);
        }
        self.evidence.extend(update.evidence);
        if let Some(anomalies) = update.anomalies {
            self.anomalies = anomalies;
        }
        if let Some(findings) = update.findings {
            self.findings = Some(findings);
        }
        if let Some(proposal) = update.proposal {
            self.proposal = Some(proposal);
        }
        self.settlements.extend(update.settlements);
        self.risk_scores.extend(update.risk_scores);
        if let Some(audit) = update.audit {
            self.audit = Some(audit);
        }
        self.error_log.extend(update.errors);
    }
}
