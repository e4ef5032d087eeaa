// crates/narrative-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite State Store + Event Log
// Description: Durable `StateStore` and `EventLog` implementations backed
//              by a single SQLite database file.
// Purpose: Persist one `CanonicalState` JSON document per story plus an
//          append-only log of committed event JSON documents.
// Dependencies: narrative-core, rusqlite (bundled), serde_json, thiserror
// ============================================================================

//! ## Overview
//! One `SQLite` connection, guarded by a `Mutex`, in WAL journal mode with a
//! configurable busy timeout — this engine has no read/write pool or
//! background writer thread; per-story serialization is the caller's job,
//! so one connection behind a mutex is sufficient here.
//! [`SqliteStore::commit_turn`] wraps the state upsert and the batch's event
//! inserts in a single transaction, which is what gives the save-then-append
//! pair its atomicity guarantee.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use narrative_core::applier::materialise_referenced_locations;
use narrative_core::event::Event;
use narrative_core::identifiers::EventId;
use narrative_core::identifiers::StoryId;
use narrative_core::interfaces::EventLog;
use narrative_core::interfaces::EventLogError;
use narrative_core::interfaces::StateStore;
use narrative_core::interfaces::StoreError;
use narrative_core::state::CanonicalState;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

/// Current schema version. Bumped whenever `initialize_schema`'s `CREATE
/// TABLE` statements change shape.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while opening or administering the store itself, distinct
/// from the per-call [`StoreError`]/[`EventLogError`] the trait methods
/// return.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The database file's parent directory could not be created.
    #[error("failed to create parent directory for {path}: {reason}")]
    ParentDir {
        /// Configured database path.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },
    /// `SQLite` reported an error while opening the connection or running
    /// schema DDL.
    #[error("sqlite error: {0}")]
    Db(String),
    /// The database carries a schema version this crate does not know how
    /// to read.
    #[error("unsupported schema version {found}, expected {expected}")]
    UnsupportedSchemaVersion {
        /// Version found in `schema_meta`.
        found: i64,
        /// Version this build expects.
        expected: i64,
    },
}

fn db_err(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode. WAL is the recommended default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// Write-ahead log journal mode.
    #[default]
    Wal,
    /// Classic rollback-journal delete mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `PRAGMA journal_mode` value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for [`SqliteStore::new`].
///
/// # Invariants
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy-timeout passed to `sqlite3_busy_timeout`.
    pub busy_timeout_ms: u64,
    /// Journal mode pragma.
    pub journal_mode: SqliteJournalMode,
}

impl SqliteStoreConfig {
    /// Builds a config pointing at `path` with the documented defaults.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::Wal,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// A `SQLite`-backed [`StateStore`] + [`EventLog`].
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if absent) the database at `config.path`, applying
    /// pragmas and initializing the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the parent directory cannot be
    /// created, the connection cannot be opened, or schema initialization
    /// fails.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Atomically persists `state` and appends `events` in one transaction,
    /// so the save-and-append pair is always atomic. Used by the
    /// orchestration layer on PASS/AUTO_FIX.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::DuplicateEventId`] if any event's id is
    /// already present, or [`StoreError::Io`] on any other failure. Neither
    /// the state write nor any event insert is observable if this returns
    /// an error — the transaction rolls back as a whole.
    pub fn commit_turn(&self, story_id: &StoryId, state: &CanonicalState, events: &[Event]) -> Result<(), EventLogError> {
        let mut guard = self.lock();
        let tx = guard.transaction().map_err(|e| EventLogError::Io(e.to_string()))?;

        let state_json = serde_json::to_string(state).map_err(|e| EventLogError::Io(e.to_string()))?;
        let updated_at = state.meta.updated_at.as_unix_seconds().to_string();
        tx.execute(
            "INSERT INTO state (story_id, state_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(story_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
            params![story_id.as_str(), state_json, updated_at],
        )
        .map_err(|e| EventLogError::Io(e.to_string()))?;

        for event in events {
            insert_event(&tx, story_id, event)?;
        }

        tx.commit().map_err(|e| EventLogError::Io(e.to_string()))?;
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn load(&self, story_id: &StoryId) -> Result<Option<CanonicalState>, StoreError> {
        let guard = self.lock();
        let raw: Option<String> = guard
            .query_row("SELECT state_json FROM state WHERE story_id = ?1", params![story_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut state: CanonicalState = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            story_id: story_id.clone(),
            reason: format!("state_json did not parse: {e}"),
        })?;

        // Loading must tolerate an older state whose entities.locations
        // lacks some referenced ids — re-run the auto-materialiser before
        // checking invariants so states persisted before a bug fix remain
        // readable.
        materialise_referenced_locations(&mut state);

        state.check_invariants().map_err(|e| StoreError::Corrupt {
            story_id: story_id.clone(),
            reason: format!("persisted state fails referential integrity even after location auto-materialisation: {e}"),
        })?;

        Ok(Some(state))
    }

    fn save(&self, story_id: &StoryId, state: &CanonicalState) -> Result<(), StoreError> {
        let guard = self.lock();
        let state_json = serde_json::to_string(state).map_err(|e| StoreError::Io(e.to_string()))?;
        let updated_at = state.meta.updated_at.as_unix_seconds().to_string();
        guard
            .execute(
                "INSERT INTO state (story_id, state_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(story_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
                params![story_id.as_str(), state_json, updated_at],
            )
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

impl EventLog for SqliteStore {
    fn append(&self, story_id: &StoryId, event: &Event) -> Result<(), EventLogError> {
        let mut guard = self.lock();
        let tx = guard.transaction().map_err(|e| EventLogError::Io(e.to_string()))?;
        insert_event(&tx, story_id, event)?;
        tx.commit().map_err(|e| EventLogError::Io(e.to_string()))?;
        Ok(())
    }

    fn list_recent(&self, story_id: &StoryId, limit: usize, offset: usize) -> Result<Vec<Event>, EventLogError> {
        let guard = self.lock();
        let mut stmt = guard
            .prepare(
                "SELECT event_json FROM events WHERE story_id = ?1
                 ORDER BY time_order DESC, turn DESC, created_at DESC
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| EventLogError::Io(e.to_string()))?;
        let rows = stmt
            .query_map(params![story_id.as_str(), limit as i64, offset as i64], |row| row.get::<_, String>(0))
            .map_err(|e| EventLogError::Io(e.to_string()))?;
        deserialize_rows(rows)
    }

    fn get(&self, event_id: &EventId) -> Result<Option<Event>, EventLogError> {
        let guard = self.lock();
        let raw: Option<String> = guard
            .query_row("SELECT event_json FROM events WHERE event_id = ?1", params![event_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| EventLogError::Io(e.to_string()))?;
        raw.map(|raw| parse_event(&raw)).transpose()
    }

    fn by_turn(&self, story_id: &StoryId, turn: u64) -> Result<Vec<Event>, EventLogError> {
        let guard = self.lock();
        let mut stmt = guard
            .prepare("SELECT event_json FROM events WHERE story_id = ?1 AND turn = ?2 ORDER BY time_order ASC, created_at ASC")
            .map_err(|e| EventLogError::Io(e.to_string()))?;
        let rows = stmt
            .query_map(params![story_id.as_str(), turn as i64], |row| row.get::<_, String>(0))
            .map_err(|e| EventLogError::Io(e.to_string()))?;
        deserialize_rows(rows)
    }

    fn by_time_range(&self, story_id: &StoryId, min: Option<u64>, max: Option<u64>) -> Result<Vec<Event>, EventLogError> {
        let guard = self.lock();
        let raw_rows: Vec<String> = match (min, max) {
            (Some(lo), Some(hi)) => {
                let mut stmt = guard
                    .prepare("SELECT event_json FROM events WHERE story_id = ?1 AND time_order BETWEEN ?2 AND ?3 ORDER BY time_order ASC")
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                let rows = stmt
                    .query_map(params![story_id.as_str(), lo as i64, hi as i64], |row| row.get::<_, String>(0))
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(|e| EventLogError::Io(e.to_string()))?
            }
            (Some(lo), None) => {
                let mut stmt = guard
                    .prepare("SELECT event_json FROM events WHERE story_id = ?1 AND time_order >= ?2 ORDER BY time_order ASC")
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                let rows = stmt
                    .query_map(params![story_id.as_str(), lo as i64], |row| row.get::<_, String>(0))
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(|e| EventLogError::Io(e.to_string()))?
            }
            (None, Some(hi)) => {
                let mut stmt = guard
                    .prepare("SELECT event_json FROM events WHERE story_id = ?1 AND time_order <= ?2 ORDER BY time_order ASC")
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                let rows = stmt
                    .query_map(params![story_id.as_str(), hi as i64], |row| row.get::<_, String>(0))
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(|e| EventLogError::Io(e.to_string()))?
            }
            (None, None) => {
                let mut stmt = guard
                    .prepare("SELECT event_json FROM events WHERE story_id = ?1 ORDER BY time_order ASC")
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                let rows = stmt
                    .query_map(params![story_id.as_str()], |row| row.get::<_, String>(0))
                    .map_err(|e| EventLogError::Io(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(|e| EventLogError::Io(e.to_string()))?
            }
        };
        raw_rows.iter().map(|raw| parse_event(raw)).collect()
    }
}

fn insert_event(tx: &rusqlite::Transaction<'_>, story_id: &StoryId, event: &Event) -> Result<(), EventLogError> {
    let event_json = serde_json::to_string(event).map_err(|e| EventLogError::Io(e.to_string()))?;
    let created_at = event.created_at.as_unix_seconds().to_string();
    let result = tx.execute(
        "INSERT INTO events (story_id, event_id, turn, time_order, created_at, event_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![story_id.as_str(), event.event_id.as_str(), event.turn as i64, event.time.order as i64, created_at, event_json],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(EventLogError::DuplicateEventId(event.event_id.clone()))
        }
        Err(e) => Err(EventLogError::Io(e.to_string())),
    }
}

fn parse_event(raw: &str) -> Result<Event, EventLogError> {
    serde_json::from_str(raw).map_err(|e| EventLogError::Io(format!("event_json did not parse: {e}")))
}

fn deserialize_rows(rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<String>>) -> Result<Vec<Event>, EventLogError> {
    let mut events = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| EventLogError::Io(e.to_string()))?;
        events.push(parse_event(&raw)?);
    }
    Ok(events)
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::ParentDir {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)).map_err(db_err)?;
    Ok(())
}

fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);").map_err(db_err)?;

    let version: Option<i64> =
        tx.query_row("SELECT version FROM schema_meta LIMIT 1", params![], |row| row.get(0)).optional().map_err(db_err)?;

    match version {
        None => {
            tx.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION]).map_err(db_err)?;
            tx.execute_batch(
                "CREATE TABLE state (
                    story_id   TEXT PRIMARY KEY,
                    state_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE events (
                    story_id   TEXT NOT NULL,
                    event_id   TEXT PRIMARY KEY,
                    turn       INTEGER NOT NULL,
                    time_order INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    event_json TEXT NOT NULL
                );
                CREATE INDEX idx_events_story_turn ON events(story_id, turn);
                CREATE INDEX idx_events_story_time_order ON events(story_id, time_order);
                CREATE INDEX idx_events_story_id ON events(story_id);",
            )
            .map_err(db_err)?;
        }
        Some(found) if found != SCHEMA_VERSION => {
            return Err(SqliteStoreError::UnsupportedSchemaVersion { found, expected: SCHEMA_VERSION });
        }
        Some(_) => {}
    }

    tx.commit().map_err(db_err)
}

#[cfg(test)]
mod tests {
    use narrative_core::event::EntityUpdate;
    use narrative_core::event::EventTime;
    use narrative_core::event::EventType;
    use narrative_core::event::EventWhere;
    use narrative_core::event::EventWho;
    use narrative_core::event::Evidence;
    use narrative_core::event::StatePatch;
    use narrative_core::identifiers::EventId;
    use narrative_core::identifiers::StoryId;
    use narrative_core::time::Timestamp;

    use super::*;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("narrative.db");
        let store = SqliteStore::new(SqliteStoreConfig::new(path)).expect("store opens");
        (dir, store)
    }

    fn sample_event(turn: u64, order: u64) -> Event {
        let mut entity_updates = std::collections::BTreeMap::new();
        let mut metadata = narrative_core::state::Metadata::new();
        metadata.insert("k".to_string(), serde_json::json!(turn));
        entity_updates.insert(
            "player_001".to_string(),
            EntityUpdate { metadata, ..EntityUpdate::default() },
        );
        Event::new(
            EventId::new(format!("evt_{turn}_0_{order:08x}")).expect("evt_ prefix"),
            turn,
            EventTime { label: "t".to_string(), order },
            EventWhere::default(),
            EventWho::default(),
            EventType::Other,
            "something happened",
            narrative_core::state::Metadata::new(),
            StatePatch { entity_updates, ..StatePatch::default() },
            Evidence { source: "test".to_string(), text_span: None },
            Timestamp::from_unix_seconds(0),
        )
        .expect("valid event")
    }

    #[test]
    fn load_on_empty_store_returns_none() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        assert!(store.load(&story_id).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        let state = CanonicalState::initial(story_id.clone(), Timestamp::from_unix_seconds(10));
        store.save(&story_id, &state).unwrap();
        let loaded = store.load(&story_id).unwrap().expect("present");
        assert_eq!(loaded, state);
    }

    #[test]
    fn append_then_get_round_trips() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        let event = sample_event(1, 0);
        store.append(&story_id, &event).unwrap();
        let fetched = store.get(&event.event_id).unwrap().expect("present");
        assert_eq!(fetched, event);
    }

    #[test]
    fn duplicate_event_id_is_rejected() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        let event = sample_event(1, 0);
        store.append(&story_id, &event).unwrap();
        let err = store.append(&story_id, &event).unwrap_err();
        assert!(matches!(err, EventLogError::DuplicateEventId(_)));
    }

    #[test]
    fn list_recent_orders_by_time_order_desc() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        store.append(&story_id, &sample_event(1, 1)).unwrap();
        store.append(&story_id, &sample_event(2, 3)).unwrap();
        store.append(&story_id, &sample_event(3, 2)).unwrap();
        let recent = store.list_recent(&story_id, 10, 0).unwrap();
        let orders: Vec<u64> = recent.iter().map(|e| e.time.order).collect();
        assert_eq!(orders, vec![3, 2, 1]);
    }

    #[test]
    fn commit_turn_persists_state_and_events_together() {
        let (_dir, store) = temp_store();
        let story_id = StoryId::new("s1");
        let state = CanonicalState::initial(story_id.clone(), Timestamp::from_unix_seconds(5));
        let events = vec![sample_event(1, 0)];
        store.commit_turn(&story_id, &state, &events).unwrap();
        assert!(store.load(&story_id).unwrap().is_some());
        assert!(store.get(&events[0].event_id).unwrap().is_some());
    }

    #[test]
    fn reopening_an_existing_database_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("narrative.db");
        {
            let store = SqliteStore::new(SqliteStoreConfig::new(&path)).unwrap();
            let story_id = StoryId::new("s1");
            store.save(&story_id, &CanonicalState::initial(story_id.clone(), Timestamp::from_unix_seconds(0))).unwrap();
        }
        let store = SqliteStore::new(SqliteStoreConfig::new(&path)).unwrap();
        assert!(store.load(&StoryId::new("s1")).unwrap().is_some());
    }
}
