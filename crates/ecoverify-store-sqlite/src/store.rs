// crates/ecoverify-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Checkpoint Store
// Description: Durable CheckpointStore backed by SQLite WAL.
// Purpose: Persist run snapshots with deterministic serialization and integrity.
// Dependencies: ecoverify-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`CheckpointStore`] using SQLite. Each
//! save produces a canonical JSON snapshot written in a single upsert
//! transaction, so a concurrent load never observes a partial record. Loads
//! verify the stored integrity hash and fail closed on corruption. Database
//! contents are untrusted on load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;

use ecoverify_core::CheckpointStore;
use ecoverify_core::RunId;
use ecoverify_core::RunState;
use ecoverify_core::StoreError;
use ecoverify_core::canonical_json_bytes;
use ecoverify_core::hash_bytes;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// SQLite sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to SQLite `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the SQLite checkpoint store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// SQLite sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for SQLite connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while opening or migrating the store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Store schema version is newer than this binary supports.
    #[error("unsupported store schema version: {0}")]
    SchemaVersion(i64),
}

/// Maps SQLite errors onto the store-error taxonomy.
fn store_err(err: rusqlite::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable checkpoint store backed by SQLite WAL.
///
/// # Invariants
/// - Saves are transactional upserts; last write wins per run.
/// - Loads verify the stored snapshot hash and fail closed on mismatch.
/// - Safe for concurrent use across run identifiers.
pub struct SqliteCheckpointStore {
    /// Connection protected by a mutex; WAL keeps readers unblocked.
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Opens (and migrates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or the
    /// schema cannot be prepared.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(&config.path)?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a closure with the connection, recovering a poisoned lock.
    fn with_conn<T>(
        &self,
        operate: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        operate(&guard)
    }
}

/// Creates or migrates the store schema.
fn migrate(conn: &Connection) -> Result<(), SqliteStoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (
             key TEXT PRIMARY KEY,
             value INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS runs (
             run_id TEXT PRIMARY KEY,
             phase TEXT NOT NULL,
             snapshot TEXT NOT NULL,
             snapshot_hash TEXT NOT NULL,
             updated_at_ms INTEGER NOT NULL
         );",
    )?;
    let version: Option<i64> = conn
        .query_row("SELECT value FROM store_meta WHERE key = 'schema_version'", [], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION],
            )?;
            Ok(())
        }
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SqliteStoreError::SchemaVersion(found)),
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let snapshot_bytes = canonical_json_bytes(state)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let snapshot = String::from_utf8(snapshot_bytes)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let snapshot_hash = hash_bytes(snapshot.as_bytes());

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (run_id, phase, snapshot, snapshot_hash, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_id) DO UPDATE SET
                     phase = excluded.phase,
                     snapshot = excluded.snapshot,
                     snapshot_hash = excluded.snapshot_hash,
                     updated_at_ms = excluded.updated_at_ms",
                params![
                    state.run_id.as_str(),
                    state.phase.as_str(),
                    snapshot,
                    snapshot_hash.as_str(),
                    state.updated_at.as_unix_millis(),
                ],
            )
            .map_err(store_err)?;
            Ok(())
        })
    }

    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError> {
        let row: Option<(String, String)> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT snapshot, snapshot_hash FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(store_err)
        })?;

        let Some((snapshot, stored_hash)) = row else {
            return Ok(None);
        };
        let actual = hash_bytes(snapshot.as_bytes());
        if actual.as_str() != stored_hash {
            return Err(StoreError::Corrupt(format!(
                "snapshot hash mismatch for run {run_id}"
            )));
        }
        let state: RunState = serde_json::from_str(&snapshot)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(state))
    }

    fn list_active(&self) -> Result<Vec<RunId>, StoreError> {
        self.with_conn(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT run_id FROM runs WHERE phase NOT IN ('complete', 'error')
                     ORDER BY run_id",
                )
                .map_err(store_err)?;
            let rows = statement
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(store_err)?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(RunId::new(row.map_err(store_err)?));
            }
            Ok(ids)
        })
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(())).map_err(store_err)
        })
    }
}
