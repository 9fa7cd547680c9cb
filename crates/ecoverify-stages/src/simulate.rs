// crates/ecoverify-stages/src/simulate.rs
// ============================================================================
// Module: Simulate Stage
// Description: Deterministic remediation economics for detected anomalies.
// Purpose: Produce the proposal presented at the approval checkpoint.
// Dependencies: ecoverify-core
// ============================================================================

//! ## Overview
//! Simulate computes the remediation proposal from the detected anomalies:
//! recoverable consumption, monthly and annual savings, three-year net
//! present value, payback period, and carbon impact, scaled across the
//! campus. The computation is pure; the external approval's adjustment
//! factor scales outcomes at Finalize, never here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ecoverify_core::ActorId;
use ecoverify_core::Anomaly;
use ecoverify_core::AnomalyKind;
use ecoverify_core::Proposal;
use ecoverify_core::ProposalDetail;
use ecoverify_core::RunEvent;
use ecoverify_core::RunState;
use ecoverify_core::Severity;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StateUpdate;
use ecoverify_core::Timestamp;
use serde_json::json;

// ============================================================================
// SECTION: Financial and Environmental Parameters
// ============================================================================

/// Blended commercial energy rate, USD per kWh.
const COST_PER_KWH: f64 = 0.18;
/// Water rate, USD per gallon.
const COST_PER_GALLON: f64 = 0.008;
/// Discount rate used for net present value.
const DISCOUNT_RATE: f64 = 0.08;
/// Operating hours per month.
const MONTHLY_HOURS: f64 = 730.0;
/// Campus multiplier applied to per-building savings.
const CAMPUS_BUILDINGS: u32 = 3;
/// Metric tons of CO2 per kWh (grid average).
const CO2_TONS_PER_KWH: f64 = 0.000_417;
/// Fraction of an energy spike that remediation recovers.
const RECOVERABLE_ENERGY: f64 = 0.35;
/// Fraction of a water spike that remediation recovers.
const RECOVERABLE_WATER: f64 = 0.30;
/// Assumed campus-wide remediation cost, USD.
const CAMPUS_FIX_COST: f64 = 15_000.0;
/// Target reduction fraction anchoring the environmental projection.
const REDUCTION_TARGET: f64 = 0.30;

// ============================================================================
// SECTION: Simulate Stage
// ============================================================================

/// Remediation-economics stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulateStage;

impl SimulateStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StageExecutor for SimulateStage {
    fn actor(&self) -> ActorId {
        ActorId::Simulate
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let now = Timestamp::now();
        let proposal = compute_proposal(&state.anomalies, now);

        let decision = json!({
            "action": "remediation_proposal",
            "monthly_savings": proposal.monthly_savings,
            "npv_3yr": proposal.npv_3yr,
            "payback_months": proposal.payback_months,
            "co2_tons_saved_annual": proposal.co2_tons_saved_annual,
            "env_reduction_pct": proposal.env_reduction_pct,
            "campus_buildings": proposal.campus_buildings,
        });

        let feed = RunEvent::NeuralFeed {
            agent: ActorId::Simulate.as_str().to_string(),
            message: format!(
                "Remediation simulation: +${:.0}/mo across {} buildings (NPV 3yr ${:.0}). CO2 \
                 reduced: {:.1} tons/yr ({:.1}%). Payback: {:.1} mo.",
                proposal.monthly_savings,
                proposal.campus_buildings,
                proposal.npv_3yr,
                proposal.co2_tons_saved_annual,
                proposal.env_reduction_pct,
                proposal.payback_months
            ),
            severity: Severity::Low,
            timestamp: now,
        };

        Ok(StageOutput {
            outcome: StageOutcome::ProposalReady,
            update: StateUpdate {
                proposal: Some(proposal),
                ..StateUpdate::default()
            },
            decision: Some(decision),
            events: vec![feed],
        })
    }
}

// ============================================================================
// SECTION: Proposal Computation
// ============================================================================

/// Computes the remediation proposal for a set of anomalies.
#[must_use]
pub fn compute_proposal(anomalies: &[Anomaly], computed_at: Timestamp) -> Proposal {
    let campus = f64::from(CAMPUS_BUILDINGS);
    let mut monthly_savings = 0.0;
    let mut co2_tons_month = 0.0;
    let mut details = Vec::with_capacity(anomalies.len());

    for anomaly in anomalies {
        let excess = (anomaly.peak - anomaly.average).max(0.0);
        let (saving, co2) = match anomaly.kind {
            AnomalyKind::EnergySpike => {
                let recoverable_kwh = excess * MONTHLY_HOURS * RECOVERABLE_ENERGY;
                (
                    recoverable_kwh * COST_PER_KWH * campus,
                    recoverable_kwh * CO2_TONS_PER_KWH * campus,
                )
            }
            AnomalyKind::WaterSpike => {
                (excess * MONTHLY_HOURS * COST_PER_GALLON * RECOVERABLE_WATER * campus, 0.0)
            }
        };
        monthly_savings += saving;
        co2_tons_month += co2;
        details.push(ProposalDetail {
            kind: anomaly.kind,
            monthly_saving: round2(saving),
            co2_tons_saved: round3(co2),
        });
    }

    let annual_savings = monthly_savings * 12.0;
    let npv_3yr: f64 =
        (1..=3).map(|year| annual_savings / (1.0 + DISCOUNT_RATE).powi(year)).sum();
    let payback_months = round1(CAMPUS_FIX_COST / monthly_savings.max(1.0));

    let annual_co2 = co2_tons_month * 12.0;
    let baseline_annual_co2 = if annual_co2 > 0.0 { annual_co2 / REDUCTION_TARGET } else { 100.0 };
    let env_reduction_pct = round1(annual_co2 / baseline_annual_co2.max(1.0) * 100.0);

    Proposal {
        monthly_savings: round2(monthly_savings),
        annual_savings: round2(annual_savings),
        npv_3yr: round2(npv_3yr),
        payback_months,
        adjustment_factor: 1.0,
        co2_tons_saved_annual: round2(annual_co2),
        env_reduction_pct,
        campus_buildings: CAMPUS_BUILDINGS,
        details,
        computed_at,
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

/// Rounds to three decimal places.
fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}
