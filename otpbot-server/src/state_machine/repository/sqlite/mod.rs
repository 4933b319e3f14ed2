//! SQLite implementation of `SubscriberRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Forward Compatibility
//!
//! When adding new fields to `SubscriberState`, use `#[serde(default)]` so
//! old persisted states can still be deserialized. When removing fields or
//! changing types in breaking ways, add a migration that updates or
//! quarantines incompatible rows.

mod claims;


use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{RepositoryError, SubscriberRepository, UpdateClaimResult};
use crate::state_machine::state::{ChatId, SubscriberState};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed subscriber repository.
///
/// Stores subscriber states in a SQLite database for persistence across
/// restarts. Uses `tokio::task::spawn_blocking` to run synchronous rusqlite
/// operations without blocking the async runtime.
pub struct SqliteRepository {
    /// Database connection. Exposed as `pub(crate)` for test access to
    /// manipulate timestamps when testing expiry behavior.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability (survives OS/power failure)
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        // Ensure parent directory exists (unless it's :memory: or empty path)
        let path_str = path_ref.to_string_lossy();
        if path_str != ":memory:" && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;

                    // Restrictive permissions on the state directory (Unix
                    // only). This also covers the WAL/SHM files SQLite
                    // creates with default umask permissions.
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let dir_permissions = std::fs::Permissions::from_mode(0o700);
                        if let Err(e) = std::fs::set_permissions(parent, dir_permissions) {
                            warn!(
                                "Failed to set restrictive permissions on state directory: {}",
                                e
                            );
                        }
                    }
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // The database holds phone numbers and outstanding OTP codes, so the
        // file must not be world-readable.
        #[cfg(unix)]
        if path_str != ":memory:" && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // Configure durability settings.
        // We must verify WAL mode was actually enabled - SQLite can silently
        // keep DELETE mode on some filesystems (e.g., network filesystems
        // that don't support shared memory), which would violate our
        // durability/concurrency assumptions.
        //
        // For in-memory databases (:memory:), SQLite returns "memory" as the
        // journal mode, which is expected - in-memory databases are ephemeral
        // by design.
        let is_in_memory = path_str == ":memory:";
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     This can happen on filesystems that don't support shared memory \
                     (e.g., some network filesystems). The database requires WAL mode \
                     for durability and concurrency guarantees.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        // SQLite creates the WAL and SHM files with default umask permissions
        // when WAL mode is enabled; chmod them directly as well.
        #[cfg(unix)]
        if path_str != ":memory:" && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);

            let wal_path = format!("{}-wal", path_str);
            if std::path::Path::new(&wal_path).exists() {
                if let Err(e) = std::fs::set_permissions(&wal_path, permissions.clone()) {
                    warn!("Failed to set restrictive permissions on WAL file: {}", e);
                }
            }

            let shm_path = format!("{}-shm", path_str);
            if std::path::Path::new(&shm_path).exists() {
                if let Err(e) = std::fs::set_permissions(&shm_path, permissions) {
                    warn!("Failed to set restrictive permissions on SHM file: {}", e);
                }
            }
        }

        // Create schema version table if it doesn't exist
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // Get current version (0 if table is empty = fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        // Run migrations
        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1:
        // per-chat subscriber states.
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS subscribers (
                    chat_id INTEGER PRIMARY KEY,
                    state_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Migration to version 2: update-id claims for webhook dedupe.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS seen_update_ids (
                    update_id INTEGER PRIMARY KEY,
                    recorded_at INTEGER NOT NULL,
                    claim_state INTEGER NOT NULL DEFAULT 0
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }
}

/// Get current unix timestamp in seconds.
pub(super) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// =============================================================================
// SubscriberRepository trait implementation
// =============================================================================

#[async_trait]
impl SubscriberRepository for SqliteRepository {
    async fn find_or_create(&self, chat_id: ChatId) -> Result<SubscriberState, RepositoryError> {
        let conn = self.conn.clone();
        let default_json = serde_json::to_string(&SubscriberState::default())
            .map_err(|e| RepositoryError::storage("serialize state", e.to_string()))?;
        let now = now_secs();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            // INSERT OR IGNORE makes the create idempotent; the SELECT then
            // returns whichever row is actually in the table.
            conn.execute(
                "INSERT OR IGNORE INTO subscribers (chat_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![chat_id.0, default_json, now],
            )
            .map_err(|e| RepositoryError::storage("find_or_create", e.to_string()))?;

            let json: String = conn
                .query_row(
                    "SELECT state_json FROM subscribers WHERE chat_id = ?1",
                    params![chat_id.0],
                    |row| row.get(0),
                )
                .map_err(|e| RepositoryError::storage("find_or_create", e.to_string()))?;

            serde_json::from_str(&json).map_err(|_| RepositoryError::corruption("state JSON"))
        })
        .await
        .map_err(|e| RepositoryError::storage("find_or_create", e.to_string()))?
    }

    async fn update(
        &self,
        chat_id: ChatId,
        state: &SubscriberState,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let state_json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::storage("serialize state", e.to_string()))?;
        let now = now_secs();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            conn.execute(
                "INSERT INTO subscribers (chat_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                params![chat_id.0, state_json, now],
            )
            .map_err(|e| RepositoryError::storage("update", e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("update", e.to_string()))?
    }

    async fn try_claim_update_id(
        &self,
        update_id: i64,
    ) -> Result<UpdateClaimResult, RepositoryError> {
        self.try_claim_update_id_impl(update_id).await
    }

    async fn complete_update_claim(&self, update_id: i64) -> Result<(), RepositoryError> {
        self.complete_update_claim_impl(update_id).await
    }

    async fn release_update_claim(&self, update_id: i64) -> Result<(), RepositoryError> {
        self.release_update_claim_impl(update_id).await
    }

    async fn cleanup_expired_update_claims(
        &self,
        ttl_seconds: i64,
    ) -> Result<usize, RepositoryError> {
        self.cleanup_expired_update_claims_impl(ttl_seconds).await
    }
}
