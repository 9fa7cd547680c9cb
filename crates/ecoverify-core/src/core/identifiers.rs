// crates/ecoverify-core/src/core/identifiers.rs
// ============================================================================
// Module: EcoVerify Identifiers
// Description: Canonical opaque identifiers for runs, subjects, and actors.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout EcoVerify.
//! Run and subject identifiers are opaque strings; actor identifiers form a
//! closed set matching the five pipeline stages so signing keys can never be
//! requested for an unknown actor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Run Identifier
// ============================================================================

/// Opaque run identifier created when an investigation starts.
///
/// # Invariants
/// - Immutable after creation; serialized transparently as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a run identifier from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh run identifier from 16 random bytes, hex-encoded.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let mut out = String::with_capacity(32);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        Self(out)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Subject Identifier
// ============================================================================

/// Identifier of the monitored entity (e.g. a facility) supplied at start.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a new subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Actor Identifier
// ============================================================================

/// Signing actor for one pipeline stage.
///
/// # Invariants
/// - The set is closed; every decision-trace entry is attributable to one of
///   these actors and no signing key exists outside this set.
/// - Variants are stable for serialization and key-file naming.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActorId {
    /// Anomaly-detection stage actor.
    Monitor,
    /// Compliance-evaluation stage actor.
    Compliance,
    /// Remediation-simulation stage actor.
    Simulate,
    /// Human-approval checkpoint actor; signs the resume decision.
    Governor,
    /// Settlement and audit stage actor.
    Finalize,
}

impl ActorId {
    /// All known actors, in pipeline order.
    pub const ALL: [Self; 5] =
        [Self::Monitor, Self::Compliance, Self::Simulate, Self::Governor, Self::Finalize];

    /// Returns the stable wire label for the actor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Compliance => "compliance",
            Self::Simulate => "simulate",
            Self::Governor => "governor",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
