//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - Booked task records
//! - Completion records (one per finished task)
//! - Key-value store for application state, including the timer record
//! - A short log of timer states exchanged between running instances

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::state_store::{TimerStore, TIMER_STATE_KEY};
use crate::error::{ConfigError, DatabaseError};
use crate::sync::SyncMessage;
use crate::task::{CompletionRecord, Slot, TaskId, TaskRecord, TaskStatus};

/// Sync rows kept behind the newest one; older rows are pruned on publish.
const SYNC_HISTORY: i64 = 64;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database for task and timer storage.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `<data dir>/slotclock.db`. Every process opens the same file.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("slotclock.db"))
    }

    /// Open the database at `path`, creating the file and schema if they
    /// don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // Several processes share the file.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id                 TEXT PRIMARY KEY,
                position           INTEGER NOT NULL,
                description        TEXT NOT NULL DEFAULT '',
                slot_start         TEXT,
                slot_end           TEXT,
                allotted_minutes   INTEGER NOT NULL,
                elapsed_minutes    INTEGER NOT NULL DEFAULT 0,
                status             TEXT NOT NULL,
                created_at         TEXT NOT NULL,
                segment_started_at TEXT,
                completed_at       TEXT
            );

            CREATE TABLE IF NOT EXISTS completions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id          TEXT NOT NULL,
                elapsed_minutes  INTEGER NOT NULL,
                allotted_minutes INTEGER NOT NULL,
                completed_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_messages (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                origin  TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_position ON tasks(position);
            CREATE INDEX IF NOT EXISTS idx_completions_task_id ON completions(task_id);",
        )?;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Insert or overwrite a task record. New tasks go to the end.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn save_task(&self, task: &TaskRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO tasks (id, position, description, slot_start, slot_end,
                                allotted_minutes, elapsed_minutes, status, created_at,
                                segment_started_at, completed_at)
             VALUES (?1, (SELECT COALESCE(MAX(position), 0) + 1 FROM tasks),
                     ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                slot_start = excluded.slot_start,
                slot_end = excluded.slot_end,
                allotted_minutes = excluded.allotted_minutes,
                elapsed_minutes = excluded.elapsed_minutes,
                status = excluded.status,
                segment_started_at = excluded.segment_started_at,
                completed_at = excluded.completed_at",
            params![
                task.id.as_str(),
                task.description,
                task.slot.map(|s| s.start.format("%H:%M:%S").to_string()),
                task.slot.map(|s| s.end.format("%H:%M:%S").to_string()),
                task.allotted_minutes,
                task.elapsed_minutes,
                task.status.as_str(),
                task.created_at.to_rfc3339(),
                task.segment_started_at.map(|t| t.to_rfc3339()),
                task.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if any upsert fails; earlier writes are kept.
    pub fn save_tasks<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a TaskRecord>,
    ) -> Result<(), DatabaseError> {
        for task in tasks {
            self.save_task(task)?;
        }
        Ok(())
    }

    /// All tasks in booking order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn load_tasks(&self) -> Result<Vec<TaskRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, description, slot_start, slot_end, allotted_minutes, elapsed_minutes,
                    status, created_at, segment_started_at, completed_at
             FROM tasks ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| RawTask::from_row(row))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.decode()?);
        }
        Ok(tasks)
    }

    // ── Completions ──────────────────────────────────────────────────

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_completion(&self, completion: &CompletionRecord) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO completions (task_id, elapsed_minutes, allotted_minutes, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                completion.task_id.as_str(),
                completion.elapsed_minutes,
                completion.allotted_minutes,
                completion.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// # Errors
    /// Returns an error if the query fails or a timestamp cannot be decoded.
    pub fn completions(&self) -> Result<Vec<CompletionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, elapsed_minutes, allotted_minutes, completed_at
             FROM completions ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut completions = Vec::new();
        for row in rows {
            let (task_id, elapsed_minutes, allotted_minutes, completed_at) = row?;
            completions.push(CompletionRecord {
                task_id: TaskId::from(task_id),
                elapsed_minutes,
                allotted_minutes,
                completed: true,
                timestamp: parse_timestamp("completions", &completed_at)?,
            });
        }
        Ok(completions)
    }

    // ── Sync log ─────────────────────────────────────────────────────

    /// Append a message and prune old ones. Returns the new row id.
    ///
    /// # Errors
    /// Returns an error if the message cannot be encoded or written.
    pub fn publish_sync(&self, message: &SyncMessage) -> Result<i64, DatabaseError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO sync_messages (origin, payload) VALUES (?1, ?2)",
            params![message.origin.to_string(), payload],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn.execute(
            "DELETE FROM sync_messages WHERE id <= ?1",
            params![id - SYNC_HISTORY],
        )?;
        Ok(id)
    }

    /// Id of the newest sync message, 0 if there is none.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn latest_sync_id(&self) -> Result<i64, DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM sync_messages",
            [],
            |row| row.get(0),
        )?)
    }

    /// Messages newer than `after`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a payload cannot be decoded.
    pub fn sync_messages_after(
        &self,
        after: i64,
    ) -> Result<Vec<(i64, SyncMessage)>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM sync_messages WHERE id > ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![after], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            let message = serde_json::from_str(&payload).map_err(|e| DatabaseError::CorruptRow {
                table: "sync_messages".into(),
                message: format!("row {id}: {e}"),
            })?;
            messages.push((id, message));
        }
        Ok(messages)
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
    }

    /// Set a value in the kv store.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl TimerStore for Database {
    fn load(&self) -> Result<Option<String>, DatabaseError> {
        Ok(self.kv_get(TIMER_STATE_KEY)?)
    }

    fn save(&self, json: &str) -> Result<(), DatabaseError> {
        Ok(self.kv_set(TIMER_STATE_KEY, json)?)
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        Ok(self.kv_delete(TIMER_STATE_KEY)?)
    }
}

/// Column values as stored, before parsing.
struct RawTask {
    id: String,
    description: String,
    slot_start: Option<String>,
    slot_end: Option<String>,
    allotted_minutes: u32,
    elapsed_minutes: u32,
    status: String,
    created_at: String,
    segment_started_at: Option<String>,
    completed_at: Option<String>,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            slot_start: row.get(2)?,
            slot_end: row.get(3)?,
            allotted_minutes: row.get(4)?,
            elapsed_minutes: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            segment_started_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<TaskRecord, DatabaseError> {
        let status = TaskStatus::parse(&self.status).ok_or_else(|| corrupt(format!(
            "task {} has unknown status '{}'",
            self.id, self.status
        )))?;
        let slot = match (self.slot_start, self.slot_end) {
            (Some(start), Some(end)) => Some(Slot {
                start: parse_time(&start)?,
                end: parse_time(&end)?,
            }),
            _ => None,
        };
        Ok(TaskRecord {
            id: TaskId::from(self.id),
            description: self.description,
            slot,
            allotted_minutes: self.allotted_minutes,
            elapsed_minutes: self.elapsed_minutes,
            status,
            created_at: parse_timestamp("tasks", &self.created_at)?,
            segment_started_at: self
                .segment_started_at
                .as_deref()
                .map(|s| parse_timestamp("tasks", s))
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|s| parse_timestamp("tasks", s))
                .transpose()?,
        })
    }
}

fn corrupt(message: String) -> DatabaseError {
    DatabaseError::CorruptRow {
        table: "tasks".into(),
        message,
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .map_err(|e| corrupt(format!("bad slot time '{raw}': {e}")))
}

fn parse_timestamp(table: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            table: table.to_string(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}
