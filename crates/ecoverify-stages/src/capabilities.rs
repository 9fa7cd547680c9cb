// crates/ecoverify-stages/src/capabilities.rs
// ============================================================================
// Module: EcoVerify Stage Capabilities
// Description: Contracts for telemetry, regulatory lookup, and settlement.
// Purpose: Define the external-collaborator seams stages depend on.
// Dependencies: ecoverify-core, thiserror
// ============================================================================

//! ## Overview
//! Capabilities are the interface boundary to systems the core does not
//! implement: building telemetry, regulatory text, and value settlement.
//! Stage executors hold capability handles and treat every answer as
//! untrusted input to be cited and validated downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ecoverify_core::ActorId;
use ecoverify_core::SettlementRecord;
use ecoverify_core::Severity;
use ecoverify_core::SubjectId;
use ecoverify_core::TelemetrySnapshot;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors reported by capability providers.
///
/// # Invariants
/// - `Unavailable` maps to a transient stage fault; `Rejected` is fatal.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Provider is temporarily unreachable or overloaded.
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    /// Provider rejected the request as invalid.
    #[error("capability rejected request: {0}")]
    Rejected(String),
}

// ============================================================================
// SECTION: Telemetry Probe
// ============================================================================

/// Fetches consumption telemetry for a monitored subject.
pub trait TelemetryProbe: Send + Sync {
    /// Fetches the energy consumption series for the trailing window.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] when telemetry cannot be fetched.
    fn fetch_energy(
        &self,
        subject: &SubjectId,
        hours: u32,
    ) -> Result<TelemetrySnapshot, CapabilityError>;

    /// Fetches the water consumption series for the trailing window.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] when telemetry cannot be fetched.
    fn fetch_water(
        &self,
        subject: &SubjectId,
        hours: u32,
    ) -> Result<TelemetrySnapshot, CapabilityError>;
}

// ============================================================================
// SECTION: Regulatory Registry
// ============================================================================

/// One regulatory article reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Article section label (e.g. `Article 14`).
    pub section: String,
    /// Article title.
    pub title: String,
    /// Short summary of the obligation.
    pub summary: String,
}

/// Compliance assessment of one contemplated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceAssessment {
    /// Whether the action is compliant.
    pub compliant: bool,
    /// Whether human oversight is required before execution.
    pub requires_oversight: bool,
    /// Assessment rationale.
    pub rationale: String,
}

/// Queries regulatory text and assesses contemplated actions against it.
pub trait RegulatoryRegistry: Send + Sync {
    /// Returns articles matching a keyword, best matches first.
    fn query_articles(&self, keyword: &str) -> Vec<Article>;

    /// Assesses an action description at the given severity.
    fn assess(&self, action_description: &str, severity: Severity) -> ComplianceAssessment;
}

// ============================================================================
// SECTION: Settlement Ledger
// ============================================================================

/// Request for one value transfer between actors.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    /// Paying actor.
    pub from_actor: ActorId,
    /// Receiving actor.
    pub to_actor: ActorId,
    /// Transfer amount.
    pub amount: f64,
    /// Settlement memo.
    pub memo: String,
}

/// Executes value transfers and reports balances.
pub trait SettlementLedger: Send + Sync {
    /// Executes a settlement, returning the recorded receipt. A rejected
    /// transfer (e.g. insufficient balance) is a `Failed` receipt, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] when the ledger itself is unreachable.
    fn settle(&self, request: &SettlementRequest) -> Result<SettlementRecord, CapabilityError>;

    /// Returns the current balance for an actor.
    fn balance(&self, actor: ActorId) -> f64;
}
