// crates/ecoverify-stages/src/monitor.rs
// ============================================================================
// Module: Monitor Stage
// Description: Telemetry capture, citation, and anomaly detection.
// Purpose: Gather cited evidence before any downstream reasoning acts on it.
// Dependencies: ecoverify-core, crate::capabilities
// ============================================================================

//! ## Overview
//! Monitor fetches energy and water telemetry, records one citation per
//! source (a canonical hash of the snapshot), and detects consumption spikes
//! from the summary statistics. Citations must be recorded before any
//! conclusion: Compliance refuses findings whose citations do not verify
//! against the retained telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ecoverify_core::ActorId;
use ecoverify_core::Anomaly;
use ecoverify_core::AnomalyKind;
use ecoverify_core::EvidenceRecord;
use ecoverify_core::FacilityTelemetry;
use ecoverify_core::RunEvent;
use ecoverify_core::RunState;
use ecoverify_core::Severity;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StateUpdate;
use ecoverify_core::SubjectId;
use ecoverify_core::TelemetrySnapshot;
use ecoverify_core::Timestamp;
use ecoverify_core::hash_canonical_json;
use serde_json::json;

use crate::capabilities::CapabilityError;
use crate::capabilities::TelemetryProbe;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Trailing window fetched per pass, in hours.
const WINDOW_HOURS: u32 = 24;
/// Energy spike percentage that escalates severity to high.
const ENERGY_HIGH_PCT: f64 = 20.0;
/// Water spike percentage that escalates severity to high.
const WATER_HIGH_PCT: f64 = 25.0;

// ============================================================================
// SECTION: Monitor Stage
// ============================================================================

/// Anomaly-detection stage over facility telemetry.
pub struct MonitorStage {
    /// Telemetry capability handle.
    probe: Arc<dyn TelemetryProbe>,
}

impl MonitorStage {
    /// Creates the stage over a telemetry probe.
    #[must_use]
    pub fn new(probe: Arc<dyn TelemetryProbe>) -> Self {
        Self {
            probe,
        }
    }
}

impl StageExecutor for MonitorStage {
    fn actor(&self) -> ActorId {
        ActorId::Monitor
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let subject = &state.subject;
        let energy = self.probe.fetch_energy(subject, WINDOW_HOURS).map_err(fault)?;
        let water = self.probe.fetch_water(subject, WINDOW_HOURS).map_err(fault)?;
        let now = Timestamp::now();

        let evidence = vec![
            cite(
                &energy,
                format!(
                    "Energy avg={:.2} kWh, peak={:.2} kWh",
                    energy.summary.average, energy.summary.peak
                ),
                now,
            )?,
            cite(
                &water,
                format!(
                    "Water avg={:.2} gal, peak={:.2} gal",
                    water.summary.average, water.summary.peak
                ),
                now,
            )?,
        ];

        let mut anomalies = Vec::new();
        if let Some(anomaly) =
            detect(&energy, AnomalyKind::EnergySpike, ENERGY_HIGH_PCT, subject, now)
        {
            anomalies.push(anomaly);
        }
        if let Some(anomaly) = detect(&water, AnomalyKind::WaterSpike, WATER_HIGH_PCT, subject, now)
        {
            anomalies.push(anomaly);
        }

        let decision = json!({
            "action": "anomaly_scan",
            "subject": subject,
            "anomalies_found": anomalies.len(),
            "energy_avg": energy.summary.average,
            "energy_peak": energy.summary.peak,
            "water_avg": water.summary.average,
            "water_peak": water.summary.peak,
        });

        let feed = anomalies.first().map_or_else(
            || RunEvent::NeuralFeed {
                agent: ActorId::Monitor.as_str().to_string(),
                message: format!("Telemetry nominal for {subject}; no anomalies detected."),
                severity: Severity::Low,
                timestamp: now,
            },
            |primary| RunEvent::NeuralFeed {
                agent: ActorId::Monitor.as_str().to_string(),
                message: format!(
                    "{} detected ({}) in {subject}",
                    primary.kind.as_str(),
                    primary.metric
                ),
                severity: primary.severity,
                timestamp: now,
            },
        );

        Ok(StageOutput {
            outcome: StageOutcome::EvidenceGathered,
            update: StateUpdate {
                telemetry: Some(FacilityTelemetry {
                    energy,
                    water,
                }),
                evidence,
                anomalies: Some(anomalies),
                ..StateUpdate::default()
            },
            decision: Some(decision),
            events: vec![feed],
        })
    }
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

/// Builds a citation for a telemetry snapshot.
fn cite(
    snapshot: &TelemetrySnapshot,
    snippet: String,
    captured_at: Timestamp,
) -> Result<EvidenceRecord, StageFault> {
    let data_hash = hash_canonical_json(snapshot)
        .map_err(|err| StageFault::Fatal(format!("evidence hashing failed: {err}")))?;
    Ok(EvidenceRecord {
        source_id: snapshot.source_id.clone(),
        data_hash,
        snippet,
        captured_at,
    })
}

/// Detects a spike anomaly in a telemetry snapshot.
fn detect(
    snapshot: &TelemetrySnapshot,
    kind: AnomalyKind,
    high_pct: f64,
    subject: &SubjectId,
    detected_at: Timestamp,
) -> Option<Anomaly> {
    if snapshot.summary.anomaly_count == 0 {
        return None;
    }
    let average = snapshot.summary.average;
    let peak = snapshot.summary.peak;
    let pct_above = (peak - average) / average.max(1.0) * 100.0;
    let severity = if pct_above > high_pct { Severity::High } else { Severity::Medium };
    Some(Anomaly {
        kind,
        subject: subject.clone(),
        severity,
        metric: format!("+{pct_above:.1}% above average"),
        peak,
        average,
        detected_at,
    })
}
