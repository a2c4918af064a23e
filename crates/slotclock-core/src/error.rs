//! Core error types for slotclock-core.
//!
//! Nothing in the timer subsystem is fatal: most failures degrade to a safe
//! default and are only logged. The errors below are the ones that callers
//! are expected to see and act on.

use std::path::PathBuf;
use thiserror::Error;

use crate::task::TaskId;

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Data directory could not be resolved or created
    #[error("Cannot prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file exists but could not be read
    #[error("Failed to read configuration from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Task registry rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already registered: {0}")]
    AlreadyRegistered(TaskId),

    /// Pause/complete-while-running were aimed at a task that is not bound
    /// to the timer.
    #[error("Task {task_id} is not the active task (active: {})", active_label(.active))]
    NotActive {
        task_id: TaskId,
        active: Option<TaskId>,
    },

    #[error("Task {0} is already completed")]
    AlreadyCompleted(TaskId),

    #[error("Allotted minutes must be greater than zero (task {0})")]
    EmptyAllotment(TaskId),
}

fn active_label(active: &Option<TaskId>) -> &str {
    active.as_ref().map_or("none", TaskId::as_str)
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Slot end is not after its start
    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange {
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Sync transport errors. Never surfaced to the user; the channel retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync channel is closed")]
    Closed,

    #[error("No other instance is listening")]
    NoListeners,

    /// The shared store behind the transport failed
    #[error("Sync storage failed: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}
