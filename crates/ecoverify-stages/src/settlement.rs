// crates/ecoverify-stages/src/settlement.rs
// ============================================================================
// Module: In-Memory Settlement Ledger
// Description: Balance-checked actor-to-actor transfers with receipts.
// Purpose: Record the value-transfer outcome of Finalize deterministically.
// Dependencies: ecoverify-core, serde_json
// ============================================================================

//! ## Overview
//! The in-memory ledger simulates an instant-confirmation settlement network.
//! Every transfer produces a receipt: a debit that would overdraw the paying
//! actor yields a `Failed` receipt rather than an error, mirroring how an
//! external network reports a rejected transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use ecoverify_core::ActorId;
use ecoverify_core::SettlementRecord;
use ecoverify_core::SettlementStatus;
use ecoverify_core::Timestamp;
use ecoverify_core::hash_canonical_json;
use serde_json::json;

use crate::capabilities::CapabilityError;
use crate::capabilities::SettlementLedger;
use crate::capabilities::SettlementRequest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Starting balance credited to every actor wallet.
const INITIAL_BALANCE: f64 = 100.0;
/// Transaction identifier length in hex characters.
const TX_ID_LEN: usize = 40;

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Mutable ledger state behind the lock.
#[derive(Debug)]
struct LedgerInner {
    /// Actor balances.
    balances: BTreeMap<ActorId, f64>,
    /// Receipt log, append-only.
    receipts: Vec<SettlementRecord>,
    /// Monotonic transfer counter feeding transaction identifiers.
    counter: u64,
}

/// In-memory settlement ledger with balance-checked debits.
///
/// # Invariants
/// - Receipts are appended for both confirmed and failed transfers.
/// - Balances never go negative; an overdrawing debit fails the transfer.
#[derive(Debug)]
pub struct InMemoryLedger {
    /// Ledger state protected by a mutex.
    inner: Mutex<LedgerInner>,
    /// Network label stamped on receipts.
    network: String,
}

impl InMemoryLedger {
    /// Creates a ledger seeding every actor with the initial balance.
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        let mut balances = BTreeMap::new();
        for actor in ActorId::ALL {
            balances.insert(actor, INITIAL_BALANCE);
        }
        Self {
            inner: Mutex::new(LedgerInner {
                balances,
                receipts: Vec::new(),
                counter: 0,
            }),
            network: network.into(),
        }
    }

    /// Returns all receipts recorded so far.
    #[must_use]
    pub fn receipts(&self) -> Vec<SettlementRecord> {
        match self.inner.lock() {
            Ok(guard) => guard.receipts.clone(),
            Err(poisoned) => poisoned.into_inner().receipts.clone(),
        }
    }
}

impl SettlementLedger for InMemoryLedger {
    fn settle(&self, request: &SettlementRequest) -> Result<SettlementRecord, CapabilityError> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.counter += 1;
        let tx_id = transaction_id(request, guard.counter)?;
        let timestamp = Timestamp::now();

        let from_balance = guard.balances.get(&request.from_actor).copied().unwrap_or(0.0);
        let record = if from_balance < request.amount {
            SettlementRecord {
                tx_id,
                from_actor: request.from_actor,
                to_actor: request.to_actor,
                amount: request.amount,
                network: self.network.clone(),
                status: SettlementStatus::Failed,
                memo: format!("insufficient balance: {}", request.memo),
                timestamp,
            }
        } else {
            guard.balances.insert(request.from_actor, from_balance - request.amount);
            let to_balance = guard.balances.get(&request.to_actor).copied().unwrap_or(0.0);
            guard.balances.insert(request.to_actor, to_balance + request.amount);
            SettlementRecord {
                tx_id,
                from_actor: request.from_actor,
                to_actor: request.to_actor,
                amount: request.amount,
                network: self.network.clone(),
                status: SettlementStatus::Confirmed,
                memo: request.memo.clone(),
                timestamp,
            }
        };
        guard.receipts.push(record.clone());
        Ok(record)
    }

    fn balance(&self, actor: ActorId) -> f64 {
        match self.inner.lock() {
            Ok(guard) => guard.balances.get(&actor).copied().unwrap_or(0.0),
            Err(poisoned) => poisoned.into_inner().balances.get(&actor).copied().unwrap_or(0.0),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Derives a deterministic transaction identifier for a transfer.
fn transaction_id(request: &SettlementRequest, counter: u64) -> Result<String, CapabilityError> {
    let digest = hash_canonical_json(&json!({
        "from": request.from_actor,
        "to": request.to_actor,
        "amount": request.amount,
        "counter": counter,
    }))
    .map_err(|err| CapabilityError::Rejected(err.to_string()))?;
    Ok(digest.as_str().chars().take(TX_ID_LEN).collect())
}
