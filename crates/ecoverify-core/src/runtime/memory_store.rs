// crates/ecoverify-core/src/runtime/memory_store.rs
// ============================================================================
// Module: EcoVerify In-Memory Store
// Description: Simple in-memory checkpoint store for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of
//! [`CheckpointStore`] for tests and local demos. It is not intended for
//! production use; the SQLite store crate is the durable implementation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::RunId;
use crate::core::RunState;
use crate::interfaces::CheckpointStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory checkpoint store for tests and examples.
///
/// # Invariants
/// - `save` replaces the whole snapshot atomically under the map lock, so a
///   concurrent `load` observes either the old or the new record.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStore {
    /// Run state map protected by a mutex.
    runs: Arc<Mutex<BTreeMap<String, RunState>>>,
}

impl InMemoryCheckpointStore {
    /// Creates a new in-memory checkpoint store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        self.runs
            .lock()
            .map_err(|_| StoreError::Store("checkpoint store mutex poisoned".to_string()))?
            .insert(state.run_id.as_str().to_string(), state.clone());
        Ok(())
    }

    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError> {
        let guard = self
            .runs
            .lock()
            .map_err(|_| StoreError::Store("checkpoint store mutex poisoned".to_string()))?;
        Ok(guard.get(run_id.as_str()).cloned())
    }

    fn list_active(&self) -> Result<Vec<RunId>, StoreError> {
        let guard = self
            .runs
            .lock()
            .map_err(|_| StoreError::Store("checkpoint store mutex poisoned".to_string()))?;
        Ok(guard
            .values()
            .filter(|state| !state.phase.is_terminal())
            .map(|state| state.run_id.clone())
            .collect())
    }
}
