//! # Slotclock Core Library
//!
//! Core logic for the Slotclock focus timer: a work/break countdown, a
//! registry of time-boxed tasks that drive it, and best-effort state sync
//! between running instances. The `slotclock` CLI is a thin layer over this
//! crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a countdown state machine that advances only when the
//!   caller invokes `tick()`, persisting itself after every change
//! - **Task Registry**: tasks with an allotment and accumulated minutes, at
//!   most one of them bound to the running timer
//! - **Sync**: last-write-wins broadcast of timer state between instances,
//!   carried between processes through the shared database file
//! - **Storage**: SQLite for tasks, completions and timer state, TOML for
//!   configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: the countdown state machine
//! - [`TaskRegistry`]: task lifecycle and elapsed-time accounting
//! - [`TimerService`]: async driver with a one-second ticker
//! - [`SyncChannel`]: cross-instance broadcast with automatic reconnect
//! - [`Database`] and [`Config`]: persistence

pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod service;
pub mod storage;
pub mod sync;
pub mod task;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, DatabaseError, SyncError, TaskError, ValidationError};
pub use events::Event;
pub use notify::{LogNotifier, Notifier};
pub use service::{Core, TimerService};
pub use storage::{Config, Database, MemoryStore, TimerStore};
pub use sync::{LocalBus, SqliteBus, SyncChannel, SyncListener, SyncMessage, SyncTransport};
pub use task::{CompletionRecord, Slot, TaskId, TaskRecord, TaskRegistry, TaskReport, TaskStatus};
pub use timer::{Ticker, TimerDurations, TimerEngine, TimerMode, TimerState};
