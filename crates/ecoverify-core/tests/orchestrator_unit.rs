// crates/ecoverify-core/tests/orchestrator_unit.rs
// ============================================================================
// Module: Orchestrator Unit Tests
// Description: State-machine behavior under scripted stages and faulty stores.
// Purpose: Validate retry bounds, suspension, persistence atomicity, recovery.
// ============================================================================

//! Orchestrator tests with scripted stage executors: phase progression, the
//! bounded self-correction loop, protocol misuse on resume, cancellation,
//! persistence-failure semantics, and restart recovery.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use ecoverify_core::ActorId;
use ecoverify_core::Anomaly;
use ecoverify_core::AnomalyKind;
use ecoverify_core::CheckpointStore;
use ecoverify_core::EventSink;
use ecoverify_core::InMemoryCheckpointStore;
use ecoverify_core::KeyStore;
use ecoverify_core::Orchestrator;
use ecoverify_core::OrchestratorConfig;
use ecoverify_core::OrchestratorError;
use ecoverify_core::Phase;
use ecoverify_core::Proposal;
use ecoverify_core::RunEvent;
use ecoverify_core::RunId;
use ecoverify_core::RunState;
use ecoverify_core::SettlementRecord;
use ecoverify_core::SettlementStatus;
use ecoverify_core::Severity;
use ecoverify_core::SigningService;
use ecoverify_core::StageExecutor;
use ecoverify_core::StageFault;
use ecoverify_core::StageOutcome;
use ecoverify_core::StageOutput;
use ecoverify_core::StageSet;
use ecoverify_core::StateUpdate;
use ecoverify_core::StoreError;
use ecoverify_core::SubjectId;
use ecoverify_core::Timestamp;
use serde_json::json;

// ============================================================================
// SECTION: Test Fixtures
// ============================================================================

/// Event sink recording everything published.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(RunId, RunEvent)>>,
}

impl RecordingSink {
    fn events_for(&self, run_id: &RunId) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

/// Shared handle over a [`RecordingSink`] that satisfies [`EventSink`].
///
/// The orphan rule forbids implementing the foreign `EventSink` trait directly
/// for `Arc<RecordingSink>`, so this local newtype carries the impl while still
/// letting the test retain a clone of the underlying sink for inspection.
#[derive(Clone)]
struct SharedSink(Arc<RecordingSink>);

impl EventSink for SharedSink {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        self.0.events.lock().unwrap().push((run_id.clone(), event.clone()));
    }
}

/// Scripted stage returning a fixed outcome, counting invocations.
struct ScriptedStage {
    actor: ActorId,
    calls: Arc<AtomicU32>,
    behavior: Box<dyn Fn(&RunState, u32) -> Result<StageOutput, StageFault> + Send + Sync>,
}

impl ScriptedStage {
    fn new(
        actor: ActorId,
        calls: Arc<AtomicU32>,
        behavior: impl Fn(&RunState, u32) -> Result<StageOutput, StageFault> + Send + Sync + 'static,
    ) -> Box<Self> {
        Box::new(Self {
            actor,
            calls,
            behavior: Box::new(behavior),
        })
    }
}

impl StageExecutor for ScriptedStage {
    fn actor(&self) -> ActorId {
        self.actor
    }

    fn execute(&self, state: &RunState) -> Result<StageOutput, StageFault> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behavior)(state, call)
    }
}

/// One detected anomaly for scripted monitors.
fn anomaly(subject: &SubjectId) -> Anomaly {
    Anomaly {
        kind: AnomalyKind::EnergySpike,
        subject: subject.clone(),
        severity: Severity::High,
        metric: "+30.0% above average".to_string(),
        peak: 180.0,
        average: 130.0,
        detected_at: Timestamp::from_unix_millis(1_700_000_000_000),
    }
}

/// Scripted proposal with a known estimated outcome.
fn proposal(monthly: f64) -> Proposal {
    Proposal {
        monthly_savings: monthly,
        annual_savings: monthly * 12.0,
        npv_3yr: monthly * 30.0,
        payback_months: 2.2,
        adjustment_factor: 1.0,
        co2_tons_saved_annual: 53.5,
        env_reduction_pct: 30.0,
        campus_buildings: 3,
        details: Vec::new(),
        computed_at: Timestamp::from_unix_millis(1_700_000_000_000),
    }
}

/// Output helper for completing outcomes.
fn output(outcome: StageOutcome, update: StateUpdate, decision: serde_json::Value) -> StageOutput {
    StageOutput {
        outcome,
        update,
        decision: Some(decision),
        events: Vec::new(),
    }
}

/// Stage counters for assertions.
struct Counters {
    monitor: Arc<AtomicU32>,
    compliance: Arc<AtomicU32>,
    finalize: Arc<AtomicU32>,
}

/// Builds a happy-path scripted stage set; `compliance_invalid_always` forces
/// the citation-failure outcome on every Compliance invocation.
fn scripted_stages(compliance_invalid_always: bool) -> (StageSet, Counters) {
    let monitor_calls = Arc::new(AtomicU32::new(0));
    let compliance_calls = Arc::new(AtomicU32::new(0));
    let simulate_calls = Arc::new(AtomicU32::new(0));
    let governor_calls = Arc::new(AtomicU32::new(0));
    let finalize_calls = Arc::new(AtomicU32::new(0));

    let monitor = ScriptedStage::new(ActorId::Monitor, Arc::clone(&monitor_calls), |state, _| {
        Ok(output(
            StageOutcome::EvidenceGathered,
            StateUpdate {
                anomalies: Some(vec![anomaly(&state.subject)]),
                ..StateUpdate::default()
            },
            json!({"action": "anomaly_scan", "anomalies_found": 1}),
        ))
    });
    let compliance =
        ScriptedStage::new(ActorId::Compliance, Arc::clone(&compliance_calls), move |_, _| {
            if compliance_invalid_always {
                Ok(StageOutput {
                    outcome: StageOutcome::CitationsInvalid,
                    update: StateUpdate::default(),
                    decision: None,
                    events: Vec::new(),
                })
            } else {
                Ok(output(
                    StageOutcome::FindingsValid,
                    StateUpdate::default(),
                    json!({"action": "compliance_evaluation", "status": "compliant"}),
                ))
            }
        });
    let simulate = ScriptedStage::new(ActorId::Simulate, Arc::clone(&simulate_calls), |_, _| {
        Ok(output(
            StageOutcome::ProposalReady,
            StateUpdate {
                proposal: Some(proposal(1_000.0)),
                ..StateUpdate::default()
            },
            json!({"action": "remediation_proposal", "monthly_savings": 1000.0}),
        ))
    });
    let governor = ScriptedStage::new(ActorId::Governor, Arc::clone(&governor_calls), |_, _| {
        Ok(StageOutput {
            outcome: StageOutcome::Suspended,
            update: StateUpdate::default(),
            decision: None,
            events: vec![RunEvent::Interrupt {}],
        })
    });
    let finalize = ScriptedStage::new(ActorId::Finalize, Arc::clone(&finalize_calls), |state, _| {
        let approval = state.approval.as_ref().expect("finalize runs after approval");
        let monthly = state.proposal.as_ref().map_or(0.0, |p| p.monthly_savings);
        let amount = monthly * approval.adjustment_factor * 0.001;
        Ok(output(
            StageOutcome::Settled,
            StateUpdate {
                settlements: vec![SettlementRecord {
                    tx_id: "tx-1".to_string(),
                    from_actor: ActorId::Simulate,
                    to_actor: ActorId::Governor,
                    amount,
                    network: "testnet".to_string(),
                    status: SettlementStatus::Confirmed,
                    memo: "fee".to_string(),
                    timestamp: Timestamp::from_unix_millis(1_700_000_000_000),
                }],
                ..StateUpdate::default()
            },
            json!({"action": "final_settlement", "settlement_amount": amount}),
        ))
    });

    let counters = Counters {
        monitor: monitor_calls,
        compliance: compliance_calls,
        finalize: finalize_calls,
    };
    (StageSet::new(monitor, compliance, simulate, governor, finalize), counters)
}

type TestOrchestrator = Orchestrator<InMemoryCheckpointStore, SharedSink>;

/// Builds an orchestrator over an in-memory store and recording sink.
fn build(
    store: InMemoryCheckpointStore,
    stages: StageSet,
    config: OrchestratorConfig,
) -> (Arc<TestOrchestrator>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        store,
        SharedSink(Arc::clone(&sink)),
        SigningService::new(KeyStore::generate()),
        stages,
        config,
    )
    .unwrap();
    (Arc::new(orchestrator), sink)
}

// ============================================================================
// SECTION: Phase Progression
// ============================================================================

#[test]
fn start_reports_starting_and_first_advance_reaches_monitor_done() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );

    let state = orchestrator.start(SubjectId::new("HQ-01")).unwrap();
    assert_eq!(state.phase, Phase::Starting, "start never races ahead of Monitor");

    let phase = orchestrator.advance(&state.run_id).unwrap();
    assert_eq!(phase, Phase::MonitorDone);
    assert_ne!(phase, Phase::Interrupted, "a single step can never reach suspension");
}

#[test]
fn pipeline_suspends_at_interrupted_and_resume_completes() {
    let (stages, counters) = scripted_stages(false);
    let (orchestrator, sink) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );

    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    let phase = orchestrator.run_until_suspended(&run_id).unwrap();
    assert_eq!(phase, Phase::Interrupted);

    let suspended = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(suspended.decision_trace.len(), 3, "monitor, compliance, simulate");
    assert!(suspended.approval.is_none());

    let phase = orchestrator.resume(&run_id, true, 1.2).unwrap();
    assert_eq!(phase, Phase::Complete);
    assert_eq!(counters.finalize.load(Ordering::SeqCst), 1);

    let done = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(done.decision_trace.len(), 5, "governor and finalize appended");
    assert!(done.approval.as_ref().unwrap().granted);
    let settlement = &done.settlements[0];
    assert!((settlement.amount - 1.2).abs() < 1e-9, "1000 * 1.2 * 0.001");

    let events = sink.events_for(&run_id);
    assert!(events.iter().any(|event| matches!(event, RunEvent::Interrupt {})));
    assert!(matches!(events.last().unwrap(), RunEvent::Complete { phase: Phase::Complete }));
}

#[test]
fn every_trace_entry_verifies_after_completion() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    orchestrator.run_until_suspended(&run_id).unwrap();
    orchestrator.resume(&run_id, true, 1.0).unwrap();

    let traces = orchestrator.traces(&run_id).unwrap();
    assert_eq!(traces.len(), 5);
    assert!(traces.iter().all(|trace| trace.verified));
    let actors: Vec<ActorId> = traces.iter().map(|trace| trace.entry.actor_id).collect();
    assert_eq!(actors, vec![
        ActorId::Monitor,
        ActorId::Compliance,
        ActorId::Simulate,
        ActorId::Governor,
        ActorId::Finalize,
    ]);
}

// ============================================================================
// SECTION: Self-Correction Loop
// ============================================================================

#[test]
fn citation_failures_exhaust_after_exactly_max_retries_plus_one() {
    let (stages, counters) = scripted_stages(true);
    let config = OrchestratorConfig {
        max_citation_retries: 3,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = build(InMemoryCheckpointStore::new(), stages, config);

    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    let phase = orchestrator.run_until_suspended(&run_id).unwrap();

    assert_eq!(phase, Phase::Error);
    assert_eq!(
        counters.compliance.load(Ordering::SeqCst),
        4,
        "compliance runs exactly max_retries + 1 times"
    );
    assert_eq!(counters.monitor.load(Ordering::SeqCst), 1, "monitor is never re-invoked");

    let state = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(state.retry_count, 4);
    assert!(state.error_log.iter().any(|line| line.contains("citation validation exhausted")));
}

// ============================================================================
// SECTION: Protocol Misuse
// ============================================================================

#[test]
fn second_resume_is_rejected_without_a_second_settlement() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    orchestrator.run_until_suspended(&run_id).unwrap();
    orchestrator.resume(&run_id, true, 1.0).unwrap();

    let err = orchestrator.resume(&run_id, true, 1.0).unwrap_err();
    assert!(matches!(err, OrchestratorError::RunTerminal(..)));
    assert_eq!(orchestrator.snapshot(&run_id).unwrap().settlements.len(), 1);
}

#[test]
fn resume_before_interruption_is_rejected() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;

    let err = orchestrator.resume(&run_id, true, 1.0).unwrap_err();
    assert!(matches!(err, OrchestratorError::NotInterrupted(_, Phase::Starting)));
    assert!(orchestrator.snapshot(&run_id).unwrap().approval.is_none());
}

#[test]
fn out_of_range_adjustment_is_rejected_without_mutation() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    orchestrator.run_until_suspended(&run_id).unwrap();

    for bad in [0.49, 1.51, f64::NAN, f64::INFINITY] {
        let err = orchestrator.resume(&run_id, true, bad).unwrap_err();
        assert!(matches!(err, OrchestratorError::AdjustmentOutOfRange { .. }), "{bad} rejected");
    }
    let state = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(state.phase, Phase::Interrupted);
    assert!(state.approval.is_none());
}

#[test]
fn denial_completes_without_settlement() {
    let (stages, counters) = scripted_stages(false);
    let (orchestrator, _) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    orchestrator.run_until_suspended(&run_id).unwrap();

    let phase = orchestrator.resume(&run_id, false, 1.0).unwrap();
    assert_eq!(phase, Phase::Complete);
    assert_eq!(counters.finalize.load(Ordering::SeqCst), 0, "no settlement on denial");

    let state = orchestrator.snapshot(&run_id).unwrap();
    assert!(state.settlements.is_empty());
    assert!(!state.approval.as_ref().unwrap().granted);
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

#[test]
fn cancel_forces_error_and_is_terminal() {
    let (stages, _) = scripted_stages(false);
    let (orchestrator, sink) = build(
        InMemoryCheckpointStore::new(),
        stages,
        OrchestratorConfig::default(),
    );
    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    orchestrator.run_until_suspended(&run_id).unwrap();

    let phase = orchestrator.cancel(&run_id, "operator abort").unwrap();
    assert_eq!(phase, Phase::Error);
    let state = orchestrator.snapshot(&run_id).unwrap();
    assert!(state.error_log.iter().any(|line| line.contains("operator abort")));

    let err = orchestrator.cancel(&run_id, "again").unwrap_err();
    assert!(matches!(err, OrchestratorError::RunTerminal(..)));

    let events = sink.events_for(&run_id);
    assert!(matches!(events.last().unwrap(), RunEvent::Complete { phase: Phase::Error }));
}

// ============================================================================
// SECTION: Persistence Atomicity
// ============================================================================

/// Store that fails every save once armed.
#[derive(Clone)]
struct FailingStore {
    inner: InMemoryCheckpointStore,
    fail: Arc<AtomicU32>,
}

impl CheckpointStore for FailingStore {
    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) == 1 {
            return Err(StoreError::Io("disk unavailable".to_string()));
        }
        self.inner.save(state)
    }

    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError> {
        self.inner.load(run_id)
    }

    fn list_active(&self) -> Result<Vec<RunId>, StoreError> {
        self.inner.list_active()
    }
}

#[test]
fn failed_save_never_advances_the_persisted_phase() {
    let (stages, _) = scripted_stages(false);
    let fail = Arc::new(AtomicU32::new(0));
    let store = FailingStore {
        inner: InMemoryCheckpointStore::new(),
        fail: Arc::clone(&fail),
    };
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        SharedSink(Arc::clone(&sink)),
        SigningService::new(KeyStore::generate()),
        stages,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    fail.store(1, Ordering::SeqCst);

    let err = orchestrator.advance(&run_id).unwrap_err();
    assert!(matches!(err, OrchestratorError::Persistence(_)));
    assert_eq!(
        store.inner.load(&run_id).unwrap().unwrap().phase,
        Phase::Starting,
        "persisted phase untouched after a failed transition"
    );

    fail.store(0, Ordering::SeqCst);
    assert_eq!(orchestrator.advance(&run_id).unwrap(), Phase::MonitorDone);
}

// ============================================================================
// SECTION: Transient Faults
// ============================================================================

#[test]
fn transient_faults_retry_then_succeed() {
    let monitor_calls = Arc::new(AtomicU32::new(0));
    let monitor =
        ScriptedStage::new(ActorId::Monitor, Arc::clone(&monitor_calls), |state, call| {
            if call < 2 {
                Err(StageFault::Transient("telemetry endpoint timeout".to_string()))
            } else {
                Ok(output(
                    StageOutcome::EvidenceGathered,
                    StateUpdate {
                        anomalies: Some(vec![anomaly(&state.subject)]),
                        ..StateUpdate::default()
                    },
                    json!({"action": "anomaly_scan"}),
                ))
            }
        });
    let compliance = ScriptedStage::new(
        ActorId::Compliance,
        Arc::new(AtomicU32::new(0)),
        |_, _| {
            Ok(output(
                StageOutcome::FindingsValid,
                StateUpdate::default(),
                json!({"action": "compliance_evaluation"}),
            ))
        },
    );
    let simulate =
        ScriptedStage::new(ActorId::Simulate, Arc::new(AtomicU32::new(0)), |_, _| {
            Ok(output(
                StageOutcome::ProposalReady,
                StateUpdate {
                    proposal: Some(proposal(1_000.0)),
                    ..StateUpdate::default()
                },
                json!({"action": "remediation_proposal"}),
            ))
        });
    let governor =
        ScriptedStage::new(ActorId::Governor, Arc::new(AtomicU32::new(0)), |_, _| {
            Ok(StageOutput {
                outcome: StageOutcome::Suspended,
                update: StateUpdate::default(),
                decision: None,
                events: Vec::new(),
            })
        });
    let finalize =
        ScriptedStage::new(ActorId::Finalize, Arc::new(AtomicU32::new(0)), |_, _| {
            Ok(output(StageOutcome::Settled, StateUpdate::default(), json!({"action": "final"})))
        });

    let stages = StageSet::new(monitor, compliance, simulate, governor, finalize);
    let config = OrchestratorConfig {
        max_transient_retries: 2,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = build(InMemoryCheckpointStore::new(), stages, config);

    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    let phase = orchestrator.run_until_suspended(&run_id).unwrap();
    assert_eq!(phase, Phase::Interrupted);
    assert_eq!(monitor_calls.load(Ordering::SeqCst), 3, "two faults, then success");

    let state = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(state.transient_retries, 2);
    assert_eq!(state.error_log.len(), 2);
}

#[test]
fn transient_exhaustion_is_fatal() {
    let monitor = ScriptedStage::new(ActorId::Monitor, Arc::new(AtomicU32::new(0)), |_, _| {
        Err(StageFault::Transient("telemetry endpoint down".to_string()))
    });
    let noop = |actor: ActorId| {
        ScriptedStage::new(actor, Arc::new(AtomicU32::new(0)), |_, _| {
            Err(StageFault::Fatal("unreachable".to_string()))
        })
    };
    let stages = StageSet::new(
        monitor,
        noop(ActorId::Compliance),
        noop(ActorId::Simulate),
        noop(ActorId::Governor),
        noop(ActorId::Finalize),
    );
    let config = OrchestratorConfig {
        max_transient_retries: 1,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = build(InMemoryCheckpointStore::new(), stages, config);

    let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
    let phase = orchestrator.run_until_suspended(&run_id).unwrap();
    assert_eq!(phase, Phase::Error);
    let state = orchestrator.snapshot(&run_id).unwrap();
    assert!(state.error_log.iter().any(|line| line.contains("transient retries exhausted")));
}

// ============================================================================
// SECTION: Restart Recovery
// ============================================================================

#[test]
fn restart_resumes_from_persisted_phase_without_duplicate_traces() {
    let keys_dir = tempfile::tempdir().unwrap();
    let store = InMemoryCheckpointStore::new();

    let run_id = {
        let (stages, _) = scripted_stages(false);
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = Orchestrator::new(
            store.clone(),
            SharedSink(sink),
            SigningService::new(KeyStore::load_or_generate(keys_dir.path()).unwrap()),
            stages,
            OrchestratorConfig::default(),
        )
        .unwrap();
        let run_id = orchestrator.start(SubjectId::new("HQ-01")).unwrap().run_id;
        orchestrator.run_until_suspended(&run_id).unwrap();
        run_id
        // Orchestrator dropped here: simulated process exit.
    };

    let (stages, counters) = scripted_stages(false);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        store,
        SharedSink(sink),
        SigningService::new(KeyStore::load_or_generate(keys_dir.path()).unwrap()),
        stages,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let recovered = orchestrator.recover().unwrap();
    assert!(recovered.contains(&run_id));
    assert_eq!(counters.monitor.load(Ordering::SeqCst), 0, "no stage re-execution on recovery");

    let state = orchestrator.snapshot(&run_id).unwrap();
    assert_eq!(state.phase, Phase::Interrupted, "resumes from the exact persisted phase");
    assert_eq!(state.decision_trace.len(), 3, "no duplicated trace entries");

    orchestrator.resume(&run_id, true, 1.2).unwrap();
    let traces = orchestrator.traces(&run_id).unwrap();
    assert_eq!(traces.len(), 5);
    assert!(traces.iter().all(|trace| trace.verified), "persisted keys verify old traces");
}
