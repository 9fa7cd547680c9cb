// crates/ecoverify-stages/src/risk.rs
// ============================================================================
// Module: Composite Risk Scoring
// Description: Blends anomaly severity, compliance posture, and exposure.
// Purpose: Produce the risk assessment recorded and published at Finalize.
// Dependencies: ecoverify-core
// ============================================================================

//! ## Overview
//! The risk engine blends three weighted factors into a composite score on a
//! `[0, 1]` scale: aggregate anomaly severity, compliance posture, and
//! financial exposure (log-scaled). The blend is deterministic for a given
//! input so the same run always reports the same risk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ecoverify_core::Anomaly;
use ecoverify_core::ComplianceStatus;
use ecoverify_core::RiskCategory;
use ecoverify_core::RiskFactor;
use ecoverify_core::RiskScore;
use ecoverify_core::Severity;

// ============================================================================
// SECTION: Weights
// ============================================================================

/// Per-anomaly contribution multiplier.
const ANOMALY_UNIT: f64 = 25.0;
/// Cap on the aggregate severity sub-score.
const SEVERITY_CAP: f64 = 50.0;
/// Penalty for a non-compliant posture.
const NON_COMPLIANT_PENALTY: f64 = 30.0;
/// Penalty when compliance was never evaluated.
const UNKNOWN_PENALTY: f64 = 15.0;
/// Cap on the financial exposure sub-score.
const EXPOSURE_CAP: f64 = 20.0;
/// Blend weight of the severity factor.
const SEVERITY_WEIGHT: f64 = 0.4;
/// Blend weight of the compliance factor.
const COMPLIANCE_WEIGHT: f64 = 0.35;
/// Blend weight of the exposure factor.
const EXPOSURE_WEIGHT: f64 = 0.25;

/// Severity weight for one anomaly.
const fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::High => 0.9,
        Severity::Medium => 0.5,
        Severity::Low => 0.2,
    }
}

// ============================================================================
// SECTION: Scoring
// ============================================================================

/// Computes the composite risk score for a run's operational data.
#[must_use]
pub fn compute_risk_score(
    anomalies: &[Anomaly],
    compliance: Option<ComplianceStatus>,
    financial_exposure: f64,
) -> RiskScore {
    let severity_score = anomalies
        .iter()
        .map(|anomaly| severity_weight(anomaly.severity) * ANOMALY_UNIT)
        .sum::<f64>()
        .min(SEVERITY_CAP);

    let compliance_score = match compliance {
        Some(ComplianceStatus::Compliant) => 0.0,
        Some(ComplianceStatus::NonCompliant) => NON_COMPLIANT_PENALTY,
        None => UNKNOWN_PENALTY,
    };

    let exposure_score =
        ((financial_exposure.max(0.0) / 1_000.0).ln_1p() * 10.0).min(EXPOSURE_CAP);

    let composite = (severity_score * SEVERITY_WEIGHT
        + compliance_score * COMPLIANCE_WEIGHT
        + exposure_score * EXPOSURE_WEIGHT)
        .min(100.0);
    let score = composite / 100.0;

    let category = if score >= 0.7 {
        RiskCategory::Critical
    } else if score >= 0.4 {
        RiskCategory::Elevated
    } else {
        RiskCategory::Nominal
    };
    let severity = match category {
        RiskCategory::Critical => Severity::High,
        RiskCategory::Elevated => Severity::Medium,
        RiskCategory::Nominal => Severity::Low,
    };

    RiskScore {
        score,
        category,
        severity,
        source: "risk_engine".to_string(),
        factors: vec![
            RiskFactor {
                name: "anomaly_severity".to_string(),
                score: severity_score / 100.0,
                weight: SEVERITY_WEIGHT,
            },
            RiskFactor {
                name: "compliance_posture".to_string(),
                score: compliance_score / 100.0,
                weight: COMPLIANCE_WEIGHT,
            },
            RiskFactor {
                name: "financial_exposure".to_string(),
                score: exposure_score / 100.0,
                weight: EXPOSURE_WEIGHT,
            },
        ],
        recommendation: recommendation(category, anomalies.len(), compliance),
    }
}

/// Builds the operator-facing recommendation line.
fn recommendation(
    category: RiskCategory,
    anomaly_count: usize,
    compliance: Option<ComplianceStatus>,
) -> String {
    let posture = compliance.map_or("unknown", ComplianceStatus::as_str);
    match category {
        RiskCategory::Critical => format!(
            "CRITICAL: immediate action required. {anomaly_count} anomaly(ies) with {posture} \
             compliance posture. Activate incident response."
        ),
        RiskCategory::Elevated => format!(
            "ELEVATED: monitoring escalated. {anomaly_count} anomaly(ies) under review. \
             Schedule maintenance within 48 hours."
        ),
        RiskCategory::Nominal => {
            "NOMINAL: all metrics within acceptable thresholds. Continue standard monitoring."
                .to_string()
        }
    }
}
