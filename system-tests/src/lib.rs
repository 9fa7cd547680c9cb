// system-tests/src/lib.rs
// ============================================================================
// Module: EcoVerify System Test Harness
// Description: Shared wiring helpers for end-to-end pipeline tests.
// Purpose: Assemble the full stack (stages, bus, stores) behind one call.
// Dependencies: ecoverify-bus, ecoverify-core, ecoverify-stages, ecoverify-store-sqlite
// ============================================================================

//! ## Overview
//! The harness wires the real stage executors, the broadcast bus, a signing
//! service, and a caller-chosen checkpoint store into a [`RunRegistry`]
//! exactly as a host process would, so tests drive the system only through
//! its public boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use ecoverify_bus::EventBus;
use ecoverify_core::CheckpointStore;
use ecoverify_core::KeyStore;
use ecoverify_core::Orchestrator;
use ecoverify_core::OrchestratorConfig;
use ecoverify_core::RunRegistry;
use ecoverify_core::SigningService;
use ecoverify_stages::BuiltinRegulatory;
use ecoverify_stages::InMemoryLedger;
use ecoverify_stages::SimulatedTelemetry;
use ecoverify_stages::standard_stage_set;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fully wired pipeline over a caller-chosen checkpoint store.
pub struct Harness<S> {
    /// Public boundary surface.
    pub registry: RunRegistry<S, EventBus>,
    /// Orchestrator handle for state snapshots in assertions.
    pub orchestrator: Arc<Orchestrator<S, EventBus>>,
    /// Telemetry probe for stimulus injection.
    pub probe: Arc<SimulatedTelemetry>,
    /// Settlement ledger for balance assertions.
    pub ledger: Arc<InMemoryLedger>,
}

/// Builds the full stack over a store, loading keys from `keys_dir` so trace
/// verification survives simulated restarts.
///
/// # Panics
///
/// Panics when key material or the orchestrator cannot be constructed; the
/// harness is test-only wiring.
#[must_use]
pub fn harness<S: CheckpointStore + 'static>(store: S, keys_dir: &Path) -> Harness<S> {
    #[allow(clippy::unwrap_used, reason = "Test-only wiring is permitted to panic.")]
    let signer = SigningService::new(KeyStore::load_or_generate(keys_dir).unwrap());
    let probe = Arc::new(SimulatedTelemetry::new());
    let ledger = Arc::new(InMemoryLedger::new("devnet"));
    let stages = standard_stage_set(
        probe.clone(),
        Arc::new(BuiltinRegulatory::new()),
        ledger.clone(),
    );
    #[allow(clippy::unwrap_used, reason = "Test-only wiring is permitted to panic.")]
    let orchestrator = Arc::new(
        Orchestrator::new(store, EventBus::default(), signer, stages, OrchestratorConfig::default())
            .unwrap(),
    );
    let registry = RunRegistry::new(Arc::clone(&orchestrator), probe.clone());
    Harness {
        registry,
        orchestrator,
        probe,
        ledger,
    }
}
