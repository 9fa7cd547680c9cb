// crates/ecoverify-stages/tests/stage_unit.rs
// ============================================================================
// Module: Stage Unit Tests
// Description: Monitor detection, citation enforcement, economics, settlement.
// Purpose: Validate stage semantics against crafted run states.
// ============================================================================

//! Stage executor tests: injected stimuli produce anomalies, tampered
//! evidence fails cite-before-act, the economics are deterministic, and the
//! settlement amount reflects the approval adjustment.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use ecoverify_core::ActorId;
use ecoverify_core::Anomaly;
use ecoverify_core::AnomalyKind;
use ecoverify_core::ApprovalDecision;
use ecoverify_core::ComplianceStatus;
use ecoverify_core::KeyStore;
use ecoverify_core::RiskCategory;
use ecoverify_core::RunEvent;
use ecoverify_core::RunId;
use ecoverify_core::RunState;
use ecoverify_core::SettlementStatus;
use ecoverify_core::Severity;
use ecoverify_core::SigningService;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageOutcome;
use ecoverify_core::StimulusInjector;
use ecoverify_core::SubjectId;
use ecoverify_core::Timestamp;
use ecoverify_stages::BuiltinRegulatory;
use ecoverify_stages::ComplianceStage;
use ecoverify_stages::FinalizeStage;
use ecoverify_stages::GovernorStage;
use ecoverify_stages::InMemoryLedger;
use ecoverify_stages::MonitorStage;
use ecoverify_stages::SettlementLedger;
use ecoverify_stages::SettlementRequest;
use ecoverify_stages::SimulateStage;
use ecoverify_stages::SimulatedTelemetry;
use ecoverify_stages::TelemetryProbe;
use ecoverify_stages::compute_proposal;
use ecoverify_stages::compute_risk_score;
use ecoverify_stages::render_proof_graph;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn fresh_state(subject: &str) -> RunState {
    RunState::new(RunId::generate(), SubjectId::new(subject), Timestamp::now())
}

/// Runs Monitor on a fresh state and applies its update.
fn monitored_state(probe: &Arc<SimulatedTelemetry>, subject: &str) -> RunState {
    let mut state = fresh_state(subject);
    let probe: Arc<dyn TelemetryProbe> = probe.clone();
    let stage = MonitorStage::new(probe);
    let output = stage.execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::EvidenceGathered);
    state.apply(output.update);
    state
}

fn energy_anomaly(subject: &str, peak: f64, average: f64) -> Anomaly {
    Anomaly {
        kind: AnomalyKind::EnergySpike,
        subject: SubjectId::new(subject),
        severity: Severity::High,
        metric: "+38.5% above average".to_string(),
        peak,
        average,
        detected_at: Timestamp::from_unix_millis(1_700_000_000_000),
    }
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

#[test]
fn injected_stimulus_produces_anomalies_and_citations() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let subject = SubjectId::new("HQ-01");
    probe.inject(&subject, 1.5);

    let state = monitored_state(&probe, "HQ-01");
    assert!(!state.anomalies.is_empty(), "a 1.5x spike must be detected");
    assert_eq!(state.evidence.len(), 2, "one citation per telemetry source");
    assert!(state.telemetry.is_some());
    assert!(state.evidence.iter().any(|record| record.source_id == "bms:energy:HQ-01"));
    assert_eq!(state.anomalies[0].kind, AnomalyKind::EnergySpike);
    assert_eq!(state.anomalies[0].severity, Severity::High);
}

#[test]
fn nominal_telemetry_detects_nothing() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let state = monitored_state(&probe, "HQ-02");
    assert!(state.anomalies.is_empty());
    assert_eq!(state.evidence.len(), 2, "citations are recorded even on nominal passes");
}

#[test]
fn injection_is_consumed_by_one_pass() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let subject = SubjectId::new("HQ-03");
    probe.inject(&subject, 1.5);

    let first = monitored_state(&probe, "HQ-03");
    assert!(!first.anomalies.is_empty());
    let second = monitored_state(&probe, "HQ-03");
    assert!(second.anomalies.is_empty(), "stimulus seeds exactly one pass");
}

// ============================================================================
// SECTION: Compliance
// ============================================================================

#[test]
fn valid_citations_yield_findings() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let subject = SubjectId::new("HQ-01");
    probe.inject(&subject, 1.5);
    let state = monitored_state(&probe, "HQ-01");

    let stage = ComplianceStage::new(Arc::new(BuiltinRegulatory::new()));
    let output = stage.execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::FindingsValid);
    let findings = output.update.findings.unwrap();
    assert_eq!(findings.status, ComplianceStatus::Compliant);
    assert!(findings.requires_oversight, "high-severity anomalies require oversight");
    assert!(!findings.findings[0].articles_referenced.is_empty());
    assert!(output.decision.is_some(), "valid evaluation is a stage completion");
}

#[test]
fn tampered_telemetry_fails_cite_before_act() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let subject = SubjectId::new("HQ-01");
    probe.inject(&subject, 1.5);
    let mut state = monitored_state(&probe, "HQ-01");

    if let Some(telemetry) = state.telemetry.as_mut() {
        telemetry.energy.summary.peak += 1.0;
    }

    let stage = ComplianceStage::new(Arc::new(BuiltinRegulatory::new()));
    let output = stage.execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::CitationsInvalid);
    assert!(output.decision.is_none(), "a failed citation check is not a completion");
    assert!(!output.update.errors.is_empty());
}

#[test]
fn missing_citations_fail_cite_before_act() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let mut state = monitored_state(&probe, "HQ-01");
    state.evidence.clear();

    let stage = ComplianceStage::new(Arc::new(BuiltinRegulatory::new()));
    let output = stage.execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::CitationsInvalid);
}

#[test]
fn no_anomalies_is_compliant_by_default() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let state = monitored_state(&probe, "HQ-02");
    assert!(state.anomalies.is_empty());

    let stage = ComplianceStage::new(Arc::new(BuiltinRegulatory::new()));
    let output = stage.execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::FindingsValid);
    let findings = output.update.findings.unwrap();
    assert_eq!(findings.status, ComplianceStatus::Compliant);
    assert_eq!(findings.evaluated, 0);
    assert!(!findings.requires_oversight);
}

// ============================================================================
// SECTION: Simulate
// ============================================================================

#[test]
fn proposal_economics_are_deterministic() {
    let anomalies = vec![energy_anomaly("HQ-01", 180.0, 130.0)];
    let proposal = compute_proposal(&anomalies, Timestamp::from_unix_millis(0));

    // excess 50 kWh -> 50 * 730 * 0.35 = 12_775 recoverable kWh
    // monthly = 12_775 * 0.18 * 3 = 6_898.50
    assert_eq!(proposal.monthly_savings, 6_898.5);
    assert_eq!(proposal.annual_savings, 82_782.0);
    assert_eq!(proposal.payback_months, 2.2);
    assert_eq!(proposal.campus_buildings, 3);
    assert_eq!(proposal.adjustment_factor, 1.0);
    assert_eq!(proposal.env_reduction_pct, 30.0);
    assert!(proposal.npv_3yr > 0.0 && proposal.npv_3yr < proposal.annual_savings * 3.0);
    assert_eq!(proposal.details.len(), 1);

    let again = compute_proposal(&anomalies, Timestamp::from_unix_millis(0));
    assert_eq!(proposal, again, "same anomalies always price the same");
}

#[test]
fn simulate_stage_records_the_proposal() {
    let probe = Arc::new(SimulatedTelemetry::new());
    let subject = SubjectId::new("HQ-01");
    probe.inject(&subject, 1.5);
    let state = monitored_state(&probe, "HQ-01");

    let output = SimulateStage::new().execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::ProposalReady);
    let proposal = output.update.proposal.unwrap();
    assert!(proposal.monthly_savings > 0.0);
}

// ============================================================================
// SECTION: Governor
// ============================================================================

#[test]
fn governor_publishes_the_panel_and_suspends() {
    let mut state = fresh_state("HQ-01");
    state.anomalies = vec![energy_anomaly("HQ-01", 180.0, 130.0)];
    state.proposal = Some(compute_proposal(&state.anomalies, Timestamp::now()));

    let output = GovernorStage::new().execute(&state).unwrap();
    assert_eq!(output.outcome, StageOutcome::Suspended);
    assert!(output.decision.is_none(), "the governor signs at resume, not here");
    assert!(output.events.iter().any(|event| matches!(
        event,
        RunEvent::GovernorPanel {
            requires_approval: true,
            ..
        }
    )));
}

#[test]
fn governor_without_proposal_is_fatal() {
    let state = fresh_state("HQ-01");
    assert!(GovernorStage::new().execute(&state).is_err());
}

// ============================================================================
// SECTION: Finalize
// ============================================================================

#[test]
fn settlement_amount_reflects_the_adjustment_factor() {
    let mut state = fresh_state("HQ-01");
    state.anomalies = vec![energy_anomaly("HQ-01", 180.0, 130.0)];
    let mut proposal = compute_proposal(&state.anomalies, Timestamp::now());
    proposal.monthly_savings = 1_000.0;
    state.proposal = Some(proposal);
    state.approval = Some(ApprovalDecision {
        granted: true,
        adjustment_factor: 1.2,
        decided_at: Timestamp::now(),
    });

    let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new("testnet"));
    let output = FinalizeStage::new(Arc::clone(&ledger)).execute(&state).unwrap();

    assert_eq!(output.outcome, StageOutcome::Settled);
    let settlement = &output.update.settlements[0];
    assert_eq!(settlement.amount, 1.2, "1000 * 1.2 * 0.001");
    assert_eq!(settlement.status, SettlementStatus::Confirmed);
    assert_eq!(settlement.from_actor, ActorId::Simulate);
    assert_eq!(settlement.to_actor, ActorId::Governor);
    assert!(output.update.risk_scores.len() == 1);
    let audit = output.update.audit.unwrap();
    assert_eq!(
        audit.status,
        ecoverify_core::AuditStatus::Pending,
        "no telemetry retained, audit stays pending"
    );
    assert!(output.events.iter().any(|event| matches!(event, RunEvent::ExecutionComplete { .. })));
    assert!(output.events.iter().any(|event| matches!(event, RunEvent::ProofGraph { .. })));
}

#[test]
fn finalize_without_granted_approval_is_fatal() {
    let mut state = fresh_state("HQ-01");
    state.proposal = Some(compute_proposal(&[], Timestamp::now()));
    let ledger = Arc::new(InMemoryLedger::new("testnet"));
    assert!(FinalizeStage::new(ledger).execute(&state).is_err());
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

#[test]
fn overdrawing_transfer_fails_and_preserves_balances() {
    let ledger = InMemoryLedger::new("testnet");
    let before = ledger.balance(ActorId::Simulate);

    let receipt = ledger
        .settle(&SettlementRequest {
            from_actor: ActorId::Simulate,
            to_actor: ActorId::Governor,
            amount: before + 1_000.0,
            memo: "too much".to_string(),
        })
        .unwrap();

    assert_eq!(receipt.status, SettlementStatus::Failed);
    assert_eq!(ledger.balance(ActorId::Simulate), before);
    assert_eq!(ledger.receipts().len(), 1, "failed transfers are still recorded");
}

#[test]
fn confirmed_transfer_moves_balance() {
    let ledger = InMemoryLedger::new("testnet");
    let receipt = ledger
        .settle(&SettlementRequest {
            from_actor: ActorId::Simulate,
            to_actor: ActorId::Governor,
            amount: 2.5,
            memo: "fee".to_string(),
        })
        .unwrap();
    assert_eq!(receipt.status, SettlementStatus::Confirmed);
    assert_eq!(ledger.balance(ActorId::Simulate), 97.5);
    assert_eq!(ledger.balance(ActorId::Governor), 102.5);
    assert_eq!(receipt.tx_id.len(), 40);
}

// ============================================================================
// SECTION: Risk
// ============================================================================

#[test]
fn risk_score_is_bounded_and_categorized() {
    let nominal = compute_risk_score(&[], Some(ComplianceStatus::Compliant), 0.0);
    assert_eq!(nominal.category, RiskCategory::Nominal);
    assert!(nominal.score >= 0.0 && nominal.score <= 1.0);

    let anomalies: Vec<Anomaly> =
        (0..4).map(|_| energy_anomaly("HQ-01", 200.0, 120.0)).collect();
    let elevated = compute_risk_score(&anomalies, Some(ComplianceStatus::NonCompliant), 50_000.0);
    assert!(elevated.score > nominal.score);
    assert!(elevated.score <= 1.0);
    assert_eq!(elevated.factors.len(), 3);
    assert!(elevated.factors.iter().all(|factor| factor.score >= 0.0 && factor.score <= 1.0));
}

// ============================================================================
// SECTION: Proof Graph
// ============================================================================

#[test]
fn proof_graph_chains_signed_entries() {
    let signer = SigningService::new(KeyStore::generate());
    let entries = vec![
        signer
            .sign(ActorId::Monitor, 1, json!({"action": "anomaly_scan"}), Timestamp::now())
            .unwrap(),
        signer
            .sign(
                ActorId::Compliance,
                2,
                json!({"action": "compliance_evaluation"}),
                Timestamp::now(),
            )
            .unwrap(),
    ];

    let mermaid = render_proof_graph(&entries);
    assert!(mermaid.starts_with("graph TD"));
    assert!(mermaid.contains("monitor_0"));
    assert!(mermaid.contains("compliance_1"));
    assert!(mermaid.contains("sig:"));
    assert!(mermaid.contains("END((complete))"));
}
