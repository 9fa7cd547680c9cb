// crates/ecoverify-core/src/core/signing.rs
// ============================================================================
// Module: EcoVerify Decision Signing
// Description: Per-actor Ed25519 keys and signed decision-trace entries.
// Purpose: Produce verifiable provenance for every stage completion.
// Dependencies: base64, ed25519-dalek, rand, serde, crate::core::hashing
// ============================================================================

//! ## Overview
//! Every stage completion produces a [`DecisionTraceEntry`]: the decision
//! payload, a SHA-256 hash of its canonical JSON, and an Ed25519 signature
//! proving the specific actor produced it. Verification is deterministic:
//! replaying the canonical bytes against the public key always yields the
//! same result. It never fails loudly; any malformed input verifies as
//! false so signature checks remain a detection mechanism, not a runtime gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::core::identifiers::ActorId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Decision Trace Entry
// ============================================================================

/// Immutable, signed record of one stage decision.
///
/// # Invariants
/// - `payload_hash` is the SHA-256 hash of the canonical signable payload.
/// - `signature` covers the same canonical bytes, base64-encoded.
/// - `seq` is monotonic within a run and never reassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTraceEntry {
    /// Monotonic sequence within the run.
    pub seq: u64,
    /// Actor that produced the decision.
    pub actor_id: ActorId,
    /// Decision timestamp.
    pub timestamp: Timestamp,
    /// Structured decision content.
    pub decision: Value,
    /// SHA-256 hash of the canonical signable payload.
    pub payload_hash: HashDigest,
    /// Base64 Ed25519 signature over the canonical signable payload.
    pub signature: String,
}

/// Canonical signable content of a trace entry.
///
/// # Invariants
/// - Field set and names are stable; changing them breaks historical
///   verification.
#[derive(Debug, Serialize)]
struct SignablePayload<'a> {
    /// Actor label.
    actor_id: &'a ActorId,
    /// Decision timestamp.
    timestamp: Timestamp,
    /// Structured decision content.
    decision: &'a Value,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the signing service.
#[derive(Debug, Error)]
pub enum SigningError {
    /// No key registered for the actor.
    #[error("no signing key registered for actor: {0}")]
    UnknownActor(ActorId),
    /// Payload canonicalization failed.
    #[error("decision payload canonicalization failed: {0}")]
    Canonicalization(String),
    /// Key material could not be read or written.
    #[error("key material io error: {0}")]
    KeyIo(String),
}

impl From<io::Error> for SigningError {
    fn from(err: io::Error) -> Self {
        Self::KeyIo(err.to_string())
    }
}

// ============================================================================
// SECTION: Key Store
// ============================================================================

/// Per-actor Ed25519 key material.
///
/// # Invariants
/// - Exactly one keypair per [`ActorId`]; keys are never rotated mid-run.
#[derive(Debug)]
pub struct KeyStore {
    /// Signing keys indexed by actor.
    keys: BTreeMap<ActorId, SigningKey>,
}

impl KeyStore {
    /// Generates a fresh keypair for every known actor.
    #[must_use]
    pub fn generate() -> Self {
        let mut keys = BTreeMap::new();
        for actor in ActorId::ALL {
            keys.insert(actor, fresh_key());
        }
        Self {
            keys,
        }
    }

    /// Loads key material from `dir`, generating and persisting any missing
    /// actor keys as raw 32-byte seed files named `<actor>.key`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::KeyIo`] when the directory or a key file cannot
    /// be read or written.
    pub fn load_or_generate(dir: &Path) -> Result<Self, SigningError> {
        fs::create_dir_all(dir)?;
        let mut keys = BTreeMap::new();
        for actor in ActorId::ALL {
            let path = dir.join(format!("{actor}.key"));
            let key = if path.exists() {
                let bytes = fs::read(&path)?;
                let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    SigningError::KeyIo(format!("malformed key file: {}", path.display()))
                })?;
                SigningKey::from_bytes(&seed)
            } else {
                let key = fresh_key();
                fs::write(&path, key.to_bytes())?;
                key
            };
            keys.insert(actor, key);
        }
        Ok(Self {
            keys,
        })
    }
}

/// Generates one Ed25519 signing key from OS randomness.
fn fresh_key() -> SigningKey {
    let mut seed = [0_u8; 32];
    OsRng.fill_bytes(&mut seed);
    SigningKey::from_bytes(&seed)
}

// ============================================================================
// SECTION: Signing Service
// ============================================================================

/// Signs and verifies decision-trace entries with per-actor keys.
///
/// # Invariants
/// - Safe for concurrent use across runs; key material is read-only after
///   construction.
pub struct SigningService {
    /// Signing keys indexed by actor.
    keys: BTreeMap<ActorId, SigningKey>,
}

impl SigningService {
    /// Creates a signing service from a key store.
    #[must_use]
    pub fn new(store: KeyStore) -> Self {
        Self {
            keys: store.keys,
        }
    }

    /// Signs a decision payload, producing a complete trace entry.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::UnknownActor`] when no key is registered for
    /// `actor_id` and [`SigningError::Canonicalization`] when the payload
    /// cannot be canonicalized.
    pub fn sign(
        &self,
        actor_id: ActorId,
        seq: u64,
        decision: Value,
        timestamp: Timestamp,
    ) -> Result<DecisionTraceEntry, SigningError> {
        let key = self.keys.get(&actor_id).ok_or(SigningError::UnknownActor(actor_id))?;
        let signable = SignablePayload {
            actor_id: &actor_id,
            timestamp,
            decision: &decision,
        };
        let canonical = canonical_json_bytes(&signable)
            .map_err(|err| SigningError::Canonicalization(err.to_string()))?;
        let payload_hash = hash_bytes(&canonical);
        let signature = Base64.encode(key.sign(&canonical).to_bytes());
        Ok(DecisionTraceEntry {
            seq,
            actor_id,
            timestamp,
            decision,
            payload_hash,
            signature,
        })
    }

    /// Verifies a trace entry against the actor's public key.
    ///
    /// Returns false on any mismatch or malformed input; never panics or
    /// errors. The hash is checked before the signature so tampered payloads
    /// fail fast.
    #[must_use]
    pub fn verify(&self, entry: &DecisionTraceEntry) -> bool {
        let Some(key) = self.keys.get(&entry.actor_id) else {
            return false;
        };
        verify_with_key(&key.verifying_key(), entry)
    }

    /// Returns the verifying key for an actor, when registered.
    #[must_use]
    pub fn verifying_key(&self, actor_id: ActorId) -> Option<VerifyingKey> {
        self.keys.get(&actor_id).map(SigningKey::verifying_key)
    }
}

/// Verifies a trace entry against an explicit verifying key.
#[must_use]
pub fn verify_with_key(key: &VerifyingKey, entry: &DecisionTraceEntry) -> bool {
    let signable = SignablePayload {
        actor_id: &entry.actor_id,
        timestamp: entry.timestamp,
        decision: &entry.decision,
    };
    let Ok(canonical) = canonical_json_bytes(&signable) else {
        return false;
    };
    if hash_bytes(&canonical) != entry.payload_hash {
        return false;
    }
    let Ok(sig_bytes) = Base64.decode(&entry.signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(&canonical, &signature).is_ok()
}
