//! Booked tasks and their time accounting.
//!
//! A task is created when a slot is booked. Its status only moves forward:
//!
//! ```text
//!   NotStarted ──start──> InProgress ──complete──> Completed
//!                           │    ^
//!                         pause  start
//!                           v    │
//!                         (InProgress, clock detached)
//! ```
//!
//! There is no separate Paused status. Whether a task's clock is live is the
//! second axis, answered by the timer engine's binding
//! ([`crate::TimerEngine::is_live_for`]).

mod registry;

pub use registry::TaskRegistry;

use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Opaque, unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(format!("task-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    /// Terminal.
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(TaskStatus::NotStarted),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// A booked block of wall time within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    /// # Errors
    /// Returns `InvalidTimeRange` unless `end` is after `start`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse `HH:MM` (or `HH:MM:SS`) bounds.
    ///
    /// # Errors
    /// Returns `InvalidValue` for unparseable times and `InvalidTimeRange`
    /// for an empty or inverted range.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_time("start", start)?, parse_time("end", end)?)
    }

    /// Slot length rounded to the nearest minute.
    pub fn allotted_minutes(&self) -> u32 {
        let secs = (self.end - self.start).num_seconds().max(0);
        u32::try_from((secs + 30) / 60).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ValidationError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("'{raw}': {e}"),
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub description: String,
    #[serde(default)]
    pub slot: Option<Slot>,
    pub allotted_minutes: u32,
    /// Finalized minutes; excludes a still-open segment. May exceed the allotment.
    pub elapsed_minutes: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Start of the open accounting segment while the task's clock is live.
    #[serde(default)]
    pub segment_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        description: impl Into<String>,
        allotted_minutes: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            slot: None,
            allotted_minutes,
            elapsed_minutes: 0,
            status: TaskStatus::NotStarted,
            created_at,
            segment_started_at: None,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Handed to best-effort persistence when a task is marked done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task_id: TaskId,
    pub elapsed_minutes: u32,
    pub allotted_minutes: u32,
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Progress numbers for rendering. `ratio` is not clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Finalized minutes plus the open segment, if any.
    pub elapsed_minutes: u32,
    pub allotted_minutes: u32,
    pub ratio: f64,
    pub label: String,
}
