// crates/ecoverify-stages/src/telemetry.rs
// ============================================================================
// Module: Simulated Facility Telemetry
// Description: In-process telemetry probe with stimulus injection.
// Purpose: Produce realistic consumption series so the pipeline runs end-to-end.
// Dependencies: ecoverify-core, rand
// ============================================================================

//! ## Overview
//! The simulated probe generates a sinusoidal day/night baseline with uniform
//! noise and, when a stimulus has been injected for the subject, a spike in
//! the trailing hours of the window. Injected severities are consumed on
//! fetch: one injection seeds exactly one Monitor pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use ecoverify_core::StimulusInjector;
use ecoverify_core::SubjectId;
use ecoverify_core::TelemetryReading;
use ecoverify_core::TelemetrySnapshot;
use ecoverify_core::TelemetrySummary;
use ecoverify_core::Timestamp;
use rand::Rng;

use crate::capabilities::CapabilityError;
use crate::capabilities::TelemetryProbe;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Energy baseline in kWh.
const ENERGY_BASE: f64 = 130.0;
/// Energy day/night swing amplitude in kWh.
const ENERGY_SWING: f64 = 50.0;
/// Energy noise amplitude in kWh.
const ENERGY_NOISE: f64 = 8.0;
/// Water baseline in gallons.
const WATER_BASE: f64 = 350.0;
/// Water day/night swing amplitude in gallons.
const WATER_SWING: f64 = 120.0;
/// Water noise amplitude in gallons.
const WATER_NOISE: f64 = 20.0;
/// Number of trailing hours an injected spike covers.
const SPIKE_WINDOW_HOURS: u32 = 3;
/// Fraction of the injected energy severity carried over to water.
const WATER_SEVERITY_SCALE: f64 = 0.8;

// ============================================================================
// SECTION: Simulated Probe
// ============================================================================

/// Simulated telemetry probe with per-subject stimulus injection.
///
/// # Invariants
/// - Injected severities are consumed by the next fetch for that subject and
///   metric; repeated fetches without re-injection return nominal series.
#[derive(Debug, Default)]
pub struct SimulatedTelemetry {
    /// Injected severities keyed by `subject` (energy) and `subject:water`.
    injected: Mutex<BTreeMap<String, f64>>,
}

impl SimulatedTelemetry {
    /// Creates a probe with no injected stimuli.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the injected severity for a key.
    fn take_injected(&self, key: &str) -> f64 {
        let mut guard = match self.injected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(key).unwrap_or(0.0)
    }
}

impl TelemetryProbe for SimulatedTelemetry {
    fn fetch_energy(
        &self,
        subject: &SubjectId,
        hours: u32,
    ) -> Result<TelemetrySnapshot, CapabilityError> {
        let severity = self.take_injected(subject.as_str());
        Ok(build_series(
            format!("bms:energy:{subject}"),
            "kwh",
            ENERGY_BASE,
            ENERGY_SWING,
            ENERGY_NOISE,
            severity,
            hours,
        ))
    }

    fn fetch_water(
        &self,
        subject: &SubjectId,
        hours: u32,
    ) -> Result<TelemetrySnapshot, CapabilityError> {
        let severity = self.take_injected(&format!("{subject}:water"));
        Ok(build_series(
            format!("bms:water:{subject}"),
            "gallons",
            WATER_BASE,
            WATER_SWING,
            WATER_NOISE,
            severity,
            hours,
        ))
    }
}

impl StimulusInjector for SimulatedTelemetry {
    fn inject(&self, subject: &SubjectId, severity: f64) {
        let mut guard = match self.injected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(subject.as_str().to_string(), severity);
        guard.insert(format!("{subject}:water"), severity * WATER_SEVERITY_SCALE);
    }
}

// ============================================================================
// SECTION: Series Generation
// ============================================================================

/// Builds one telemetry series with a sinusoidal baseline and optional spike.
fn build_series(
    source_id: String,
    unit: &str,
    base: f64,
    swing: f64,
    noise_amp: f64,
    severity: f64,
    hours: u32,
) -> TelemetrySnapshot {
    let mut rng = rand::thread_rng();
    let now = Timestamp::now();
    let mut readings = Vec::new();
    let mut total = 0.0;
    let mut peak = 0.0_f64;
    let mut anomaly_count = 0_u32;

    for i in 0..hours {
        let offset_hours = i64::from(hours - 1 - i);
        let sampled_at =
            Timestamp::from_unix_millis(now.as_unix_millis() - offset_hours * 3_600_000);
        let hour_of_day = (sampled_at.as_unix_millis() / 3_600_000).rem_euclid(24) as f64;

        // Peaks mid-afternoon, troughs in the small hours.
        let baseline = base + swing * ((hour_of_day - 3.0) * std::f64::consts::PI / 12.0).sin();
        let noise = rng.gen_range(-noise_amp..=noise_amp);
        let mut value = (baseline + noise).max(0.0);

        let mut anomaly_score = 0.0;
        if severity > 0.0 && i >= hours.saturating_sub(SPIKE_WINDOW_HOURS) {
            value += baseline * severity * rng.gen_range(0.8..=1.2);
            anomaly_score = (0.5 + severity * 0.4).min(1.0);
        } else if value > baseline * 1.15 {
            anomaly_score = ((value - baseline) / baseline).min(1.0);
        }
        if anomaly_score > 0.3 {
            anomaly_count += 1;
        }

        total += value;
        peak = peak.max(value);
        readings.push(TelemetryReading {
            sampled_at,
            value,
            anomaly_score,
        });
    }

    let samples = u32::try_from(readings.len()).unwrap_or(u32::MAX);
    let average = total / f64::from(samples.max(1));
    TelemetrySnapshot {
        source_id,
        unit: unit.to_string(),
        readings,
        summary: TelemetrySummary {
            average,
            peak,
            anomaly_count,
            samples,
        },
    }
}
