// crates/ecoverify-stages/src/compliance.rs
// ============================================================================
// Module: Compliance Stage
// Description: Cite-before-act enforcement and regulatory evaluation.
// Purpose: Refuse findings whose evidence grounding does not verify.
// Dependencies: ecoverify-core, crate::capabilities
// ============================================================================

//! ## Overview
//! Compliance first verifies the citations Monitor recorded: every retained
//! telemetry snapshot must have a citation whose hash matches the snapshot's
//! canonical hash. Unverifiable grounding yields the citation-failure outcome
//! that drives the bounded self-correction loop; it is not a stage completion
//! and produces no trace entry. Valid grounding proceeds to a per-anomaly
//! regulatory assessment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ecoverify_core::ActorId;
use ecoverify_core::Anomaly;
use ecoverify_core::AnomalyFinding;
use ecoverify_core::ComplianceFindings;
use ecoverify_core::ComplianceStatus;
use ecoverify_core::RunEvent;
use ecoverify_core::RunState;
use ecoverify_core::Severity;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StateUpdate;
use ecoverify_core::TelemetrySnapshot;
use ecoverify_core::Timestamp;
use ecoverify_core::hash_canonical_json;
use serde_json::json;

use crate::capabilities::Article;
use crate::capabilities::RegulatoryRegistry;

// ============================================================================
// SECTION: Compliance Stage
// ============================================================================

/// Regulatory-evaluation stage with cite-before-act enforcement.
pub struct ComplianceStage {
    /// Regulatory capability handle.
    registry: Arc<dyn RegulatoryRegistry>,
}

impl ComplianceStage {
    /// Creates the stage over a regulatory registry.
    #[must_use]
    pub fn new(registry: Arc<dyn RegulatoryRegistry>) -> Self {
        Self {
            registry,
        }
    }
}

impl StageExecutor for ComplianceStage {
    fn actor(&self) -> ActorId {
        ActorId::Compliance
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let now = Timestamp::now();

        if !citations_verify(state) {
            return Ok(StageOutput {
                outcome: StageOutcome::CitationsInvalid,
                update: StateUpdate {
                    errors: vec![
                        "compliance: cite-before-act violation; citations missing or \
                         unverifiable"
                            .to_string(),
                    ],
                    ..StateUpdate::default()
                },
                decision: None,
                events: vec![feed(
                    "Citation verification failed; requesting fresh grounding from monitor.",
                    Severity::High,
                    now,
                )],
            });
        }

        if state.anomalies.is_empty() {
            let findings = ComplianceFindings {
                status: ComplianceStatus::Compliant,
                requires_oversight: false,
                evaluated: 0,
                findings: Vec::new(),
                reasoning: "No anomalies to evaluate; system compliant by default.".to_string(),
                evaluated_at: now,
            };
            return Ok(StageOutput {
                outcome: StageOutcome::FindingsValid,
                update: StateUpdate {
                    findings: Some(findings),
                    ..StateUpdate::default()
                },
                decision: Some(json!({
                    "action": "compliance_evaluation",
                    "status": ComplianceStatus::Compliant,
                    "anomalies_evaluated": 0,
                    "requires_oversight": false,
                })),
                events: vec![feed(
                    "No anomalies to evaluate; system compliant by default.",
                    Severity::Low,
                    now,
                )],
            });
        }

        let transparency = self.registry.query_articles("transparency");
        let oversight = self.registry.query_articles("human oversight");
        let referenced = referenced_sections(&transparency, &oversight);

        let mut findings = Vec::with_capacity(state.anomalies.len());
        for anomaly in &state.anomalies {
            let assessment = self.registry.assess(&describe(anomaly), anomaly.severity);
            findings.push(AnomalyFinding {
                anomaly: anomaly.clone(),
                compliant: assessment.compliant,
                requires_oversight: assessment.requires_oversight,
                articles_referenced: referenced.clone(),
            });
        }

        let all_compliant = findings.iter().all(|finding| finding.compliant);
        let requires_oversight = findings.iter().any(|finding| finding.requires_oversight);
        let status = if all_compliant {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        };
        let evaluated = u32::try_from(state.anomalies.len()).unwrap_or(u32::MAX);
        let report = ComplianceFindings {
            status,
            requires_oversight,
            evaluated,
            findings,
            reasoning: "Detected anomalies fall within the high-risk classification. \
                        Autonomous remediation requires human oversight before execution; \
                        transparency obligations are satisfied through decision trace logging."
                .to_string(),
            evaluated_at: now,
        };

        let verdict_feed = feed(
            &format!(
                "Verified {evaluated} anomaly(ies) against regulatory obligations: {}. Human \
                 oversight {}.",
                status.as_str(),
                if requires_oversight { "required" } else { "not required" }
            ),
            if all_compliant { Severity::Medium } else { Severity::High },
            now,
        );
        let articles_feed = feed(
            &format!("Articles referenced: {}", referenced.join(", ")),
            Severity::Low,
            now,
        );

        Ok(StageOutput {
            outcome: StageOutcome::FindingsValid,
            update: StateUpdate {
                findings: Some(report),
                ..StateUpdate::default()
            },
            decision: Some(json!({
                "action": "compliance_evaluation",
                "status": status,
                "anomalies_evaluated": evaluated,
                "requires_oversight": requires_oversight,
            })),
            events: vec![verdict_feed, articles_feed],
        })
    }
}

// ============================================================================
// SECTION: Citation Verification
// ============================================================================

/// Returns true when every retained snapshot has a verifying citation.
fn citations_verify(state: &RunState) -> bool {
    let Some(telemetry) = &state.telemetry else {
        return false;
    };
    if state.evidence.is_empty() {
        return false;
    }
    snapshot_cited(state, &telemetry.energy) && snapshot_cited(state, &telemetry.water)
}

/// Returns true when a snapshot has a citation whose hash still matches.
fn snapshot_cited(state: &RunState, snapshot: &TelemetrySnapshot) -> bool {
    let Ok(expected) = hash_canonical_json(snapshot) else {
        return false;
    };
    state
        .evidence
        .iter()
        .any(|record| record.source_id == snapshot.source_id && record.data_hash == expected)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Describes an anomaly for regulatory assessment.
fn describe(anomaly: &Anomaly) -> String {
    format!(
        "Autonomous detection of {} anomaly in {}: {}",
        anomaly.kind.as_str(),
        anomaly.subject,
        anomaly.metric
    )
}

/// Collects the article sections referenced by an evaluation.
fn referenced_sections(transparency: &[Article], oversight: &[Article]) -> Vec<String> {
    let mut sections: Vec<String> = transparency
        .iter()
        .take(3)
        .chain(oversight.iter().take(2))
        .map(|article| article.section.clone())
        .collect();
    sections.dedup();
    sections
}

/// Builds a compliance-attributed feed event.
fn feed(message: &str, severity: Severity, timestamp: Timestamp) -> RunEvent {
    RunEvent::NeuralFeed {
        agent: ActorId::Compliance.as_str().to_string(),
        message: message.to_string(),
        severity,
        timestamp,
    }
}
