// crates/ecoverify-core/src/core/mod.rs
// ============================================================================
// Module: EcoVerify Core Types
// Description: Canonical identifiers, run state, events, hashing, and signing.
// Purpose: Provide stable, serializable types for EcoVerify runs and audit logs.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the durable run state, the closed event set published to
//! subscribers, canonical hashing, and the signed decision trace. These types
//! are the canonical source of truth for any derived API surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod events;
pub mod hashing;
pub mod identifiers;
pub mod signing;
pub mod state;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use events::ExecutionSummary;
pub use events::RunEvent;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use identifiers::ActorId;
pub use identifiers::RunId;
pub use identifiers::SubjectId;
pub use signing::DecisionTraceEntry;
pub use signing::KeyStore;
pub use signing::SigningError;
pub use signing::SigningService;
pub use signing::verify_with_key;
pub use state::Anomaly;
pub use state::AnomalyFinding;
pub use state::AnomalyKind;
pub use state::ApprovalDecision;
pub use state::AuditReport;
pub use state::AuditStatus;
pub use state::ComplianceFindings;
pub use state::ComplianceStatus;
pub use state::EvidenceRecord;
pub use state::FacilityTelemetry;
pub use state::Phase;
pub use state::Proposal;
pub use state::ProposalDetail;
pub use state::RiskCategory;
pub use state::RiskFactor;
pub use state::RiskScore;
pub use state::RunState;
pub use state::SettlementRecord;
pub use state::SettlementStatus;
pub use state::Severity;
pub use state::StageOutcome;
pub use state::StateUpdate;
pub use state::TelemetryReading;
pub use state::TelemetrySnapshot;
pub use state::TelemetrySummary;
pub use self::time::Timestamp;
