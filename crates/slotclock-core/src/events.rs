use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;
use crate::timer::TimerMode;

/// Every state change in the system produces an Event.
/// The CLI prints them; the service fans them out to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        mode: TimerMode,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// Emitted for every tick that does not finish a session.
    TimerTicked {
        mode: TimerMode,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    /// A session ran out and the next one started immediately.
    ModeChanged {
        from: TimerMode,
        to: TimerMode,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_seconds: u64,
        /// Whole minutes since the current session started.
        elapsed_minutes: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    /// Persisted state was read back at startup.
    TimerRestored {
        mode: TimerMode,
        remaining_seconds: u64,
        is_active: bool,
        drift_secs: u64,
        at: DateTime<Utc>,
    },
    /// State received from another instance replaced ours.
    StateAdopted {
        mode: TimerMode,
        remaining_seconds: u64,
        is_active: bool,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        mode: TimerMode,
        remaining_seconds: u64,
        total_secs: u64,
        is_active: bool,
        active_task_id: Option<TaskId>,
        at: DateTime<Utc>,
    },
    TaskRegistered {
        task_id: TaskId,
        allotted_minutes: u32,
        at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    TaskPaused {
        task_id: TaskId,
        /// Total accumulated minutes after this pause.
        elapsed_minutes: u32,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        elapsed_minutes: u32,
        allotted_minutes: u32,
        at: DateTime<Utc>,
    },
}
