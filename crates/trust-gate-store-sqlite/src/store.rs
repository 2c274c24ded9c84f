// crates/trust-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Trust Store
// Description: Durable TrustStore backed by SQLite WAL.
// Purpose: Persist trust records with conditional writes and integrity hashes.
// Dependencies: trust-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`TrustStore`] using `SQLite`. Each
//! record row carries its revision and a SHA-256 hash of the payload; every
//! successful write also appends the payload to a history table. Loads
//! verify integrity via the stored hash and fail closed on corruption.
//! Leases live in their own table and carry a fencing token that increments
//! whenever the lease changes hands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use trust_gate_core::Lease;
use trust_gate_core::LeaseRequest;
use trust_gate_core::RecordKey;
use trust_gate_core::StoreError;
use trust_gate_core::StoredRecord;
use trust_gate_core::Timestamp;
use trust_gate_core::TrustStore;
use trust_gate_core::hash_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of history rows retained per record.
const DEFAULT_MAX_HISTORY: u64 = 64;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum record payload size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` trust store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// History rows retained per record (older rows pruned).
    #[serde(default = "default_max_history")]
    pub max_history: u64,
}

impl SqliteStoreConfig {
    /// Returns a config with defaults for `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default history retention.
const fn default_max_history() -> u64 {
    DEFAULT_MAX_HISTORY
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Conditional write lost.
    #[error("sqlite store revision conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        /// Record key.
        key: String,
        /// Expected revision.
        expected: u64,
        /// Actual revision.
        actual: u64,
    },
    /// Lease held elsewhere.
    #[error("sqlite store lease held by {holder}")]
    LeaseHeld {
        /// Current holder.
        holder: String,
        /// Current expiry.
        expires_at: Timestamp,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteStoreError::Conflict {
                key,
                expected,
                actual,
            } => Self::VersionConflict {
                key,
                expected,
                actual,
            },
            SqliteStoreError::LeaseHeld {
                holder,
                expires_at,
            } => Self::LeaseHeld {
                holder,
                expires_at,
            },
        }
    }
}

/// Maps a `rusqlite` error into a store error.
fn db_err(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed trust store with WAL support.
#[derive(Clone)]
pub struct SqliteTrustStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTrustStore {
    /// Opens an `SQLite`-backed trust store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the number of history rows kept for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn history_len(&self, key: RecordKey) -> Result<u64, SqliteStoreError> {
        let guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM trust_record_history WHERE record_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| db_err(&err))?;
        drop(guard);
        u64::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative history count".to_string()))
    }

    /// Loads the current record for `key`.
    fn load_record(&self, key: RecordKey) -> Result<Option<StoredRecord>, SqliteStoreError> {
        let row = {
            let guard = self
                .connection
                .lock()
                .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
            let row = guard
                .query_row(
                    "SELECT revision, payload, payload_hash, updated_at FROM trust_records WHERE \
                     record_key = ?1",
                    params![key.as_str()],
                    |row| {
                        let revision: i64 = row.get(0)?;
                        let payload: Vec<u8> = row.get(1)?;
                        let hash: String = row.get(2)?;
                        let updated_at: i64 = row.get(3)?;
                        Ok((revision, payload, hash, updated_at))
                    },
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            drop(guard);
            row
        };
        let Some((revision, payload, hash, updated_at)) = row else {
            return Ok(None);
        };
        let revision = u64::try_from(revision)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid revision for {key}")))?;
        if payload.len() > MAX_RECORD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_RECORD_BYTES,
                actual_bytes: payload.len(),
            });
        }
        if hash_bytes(&payload).as_str() != hash {
            return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {key}")));
        }
        let updated_at = u64::try_from(updated_at).unwrap_or(0);
        Ok(Some(StoredRecord {
            revision,
            payload,
            updated_at: Timestamp::from_millis(updated_at),
        }))
    }

    /// Writes a record when the stored revision matches.
    fn swap_record(
        &self,
        key: RecordKey,
        expected_revision: u64,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<u64, SqliteStoreError> {
        if payload.len() > MAX_RECORD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_RECORD_BYTES,
                actual_bytes: payload.len(),
            });
        }
        let digest = hash_bytes(payload);
        let now_ms = to_sql_millis(now);
        let mut guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let actual = current_revision(&tx, key)?;
        if actual != expected_revision {
            return Err(SqliteStoreError::Conflict {
                key: key.as_str().to_string(),
                expected: expected_revision,
                actual,
            });
        }
        let next = actual
            .checked_add(1)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("revision overflow for {key}")))?;
        let next_sql = i64::try_from(next)
            .map_err(|_| SqliteStoreError::Corrupt(format!("revision overflow for {key}")))?;
        tx.execute(
            "INSERT INTO trust_records (record_key, revision, payload, payload_hash, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(record_key) DO UPDATE SET revision = \
             excluded.revision, payload = excluded.payload, payload_hash = excluded.payload_hash, \
             updated_at = excluded.updated_at",
            params![key.as_str(), next_sql, payload, digest.as_str(), now_ms],
        )
        .map_err(|err| db_err(&err))?;
        tx.execute(
            "INSERT OR REPLACE INTO trust_record_history (record_key, revision, payload, \
             payload_hash, saved_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.as_str(), next_sql, payload, digest.as_str(), now_ms],
        )
        .map_err(|err| db_err(&err))?;
        enforce_retention(&tx, key, next_sql, self.config.max_history)?;
        tx.commit().map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(next)
    }

    /// Deletes a record when the stored revision matches.
    fn delete_record(&self, key: RecordKey, expected_revision: u64) -> Result<(), SqliteStoreError> {
        let mut guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let actual = current_revision(&tx, key)?;
        if actual != expected_revision {
            return Err(SqliteStoreError::Conflict {
                key: key.as_str().to_string(),
                expected: expected_revision,
                actual,
            });
        }
        tx.execute("DELETE FROM trust_records WHERE record_key = ?1", params![key.as_str()])
            .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(())
    }

    /// Acquires or renews a lease inside a transaction.
    fn lease(&self, request: &LeaseRequest) -> Result<Lease, SqliteStoreError> {
        let expires_at = request.now.saturating_add(Duration::from_millis(request.ttl_ms));
        let mut guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let current: Option<(String, i64, i64)> = tx
            .query_row(
                "SELECT holder, token, expires_at FROM leases WHERE name = ?1",
                params![request.name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let token: i64 = match current {
            Some((holder, token, _)) if holder == request.holder => token,
            Some((holder, _, current_expiry))
                if current_expiry > to_sql_millis(request.now) =>
            {
                return Err(SqliteStoreError::LeaseHeld {
                    holder,
                    expires_at: Timestamp::from_millis(u64::try_from(current_expiry).unwrap_or(0)),
                });
            }
            Some((_, token, _)) => token.saturating_add(1),
            None => 1,
        };
        tx.execute(
            "INSERT INTO leases (name, holder, token, expires_at) VALUES (?1, ?2, ?3, ?4) ON \
             CONFLICT(name) DO UPDATE SET holder = excluded.holder, token = excluded.token, \
             expires_at = excluded.expires_at",
            params![request.name, request.holder, token, to_sql_millis(expires_at)],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(Lease {
            name: request.name.clone(),
            holder: request.holder.clone(),
            token: u64::try_from(token).unwrap_or(0),
            expires_at,
        })
    }

    /// Releases a lease held with the same holder and token.
    fn unlease(&self, lease: &Lease) -> Result<(), SqliteStoreError> {
        let token = i64::try_from(lease.token)
            .map_err(|_| SqliteStoreError::Invalid("lease token overflow".to_string()))?;
        let guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        guard
            .execute(
                "DELETE FROM leases WHERE name = ?1 AND holder = ?2 AND token = ?3",
                params![lease.name, lease.holder, token],
            )
            .map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(())
    }
}

impl TrustStore for SqliteTrustStore {
    fn load(&self, key: RecordKey) -> Result<Option<StoredRecord>, StoreError> {
        self.load_record(key).map_err(StoreError::from)
    }

    fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_revision: u64,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        self.swap_record(key, expected_revision, payload, now).map_err(StoreError::from)
    }

    fn compare_and_delete(&self, key: RecordKey, expected_revision: u64) -> Result<(), StoreError> {
        self.delete_record(key, expected_revision).map_err(StoreError::from)
    }

    fn acquire_lease(&self, request: &LeaseRequest) -> Result<Lease, StoreError> {
        self.lease(request).map_err(StoreError::from)
    }

    fn release_lease(&self, lease: &Lease) -> Result<(), StoreError> {
        self.unlease(lease).map_err(StoreError::from)
    }

    fn location(&self) -> String {
        format!("sqlite://{}", self.config.path.display())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Db("mutex poisoned".to_string()))?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the current revision of `key` inside a transaction (0 when absent).
fn current_revision(
    tx: &rusqlite::Transaction<'_>,
    key: RecordKey,
) -> Result<u64, SqliteStoreError> {
    let revision: Option<i64> = tx
        .query_row(
            "SELECT revision FROM trust_records WHERE record_key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_err(&err))?;
    match revision {
        None => Ok(0),
        Some(value) => u64::try_from(value)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid revision for {key}"))),
    }
}

/// Converts a timestamp to a signed `SQLite` integer.
fn to_sql_millis(at: Timestamp) -> i64 {
    i64::try_from(at.as_millis()).unwrap_or(i64::MAX)
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS trust_records (
                    record_key TEXT PRIMARY KEY,
                    revision INTEGER NOT NULL,
                    payload BLOB NOT NULL,
                    payload_hash TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS trust_record_history (
                    record_key TEXT NOT NULL,
                    revision INTEGER NOT NULL,
                    payload BLOB NOT NULL,
                    payload_hash TEXT NOT NULL,
                    saved_at INTEGER NOT NULL,
                    PRIMARY KEY (record_key, revision)
                );
                CREATE TABLE IF NOT EXISTS leases (
                    name TEXT PRIMARY KEY,
                    holder TEXT NOT NULL,
                    token INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))?;
    Ok(())
}

/// Prunes history rows beyond the retention limit.
fn enforce_retention(
    tx: &rusqlite::Transaction<'_>,
    key: RecordKey,
    latest_revision: i64,
    max_history: u64,
) -> Result<(), SqliteStoreError> {
    if max_history == 0 {
        return Err(SqliteStoreError::Invalid("max_history must be greater than zero".to_string()));
    }
    let max_history = i64::try_from(max_history)
        .map_err(|_| SqliteStoreError::Invalid("max_history too large".to_string()))?;
    if latest_revision > max_history {
        let min_revision = latest_revision - max_history + 1;
        tx.execute(
            "DELETE FROM trust_record_history WHERE record_key = ?1 AND revision < ?2",
            params![key.as_str(), min_revision],
        )
        .map_err(|err| db_err(&err))?;
    }
    Ok(())
}
