//! Key-value slot holding the persisted timer record.
//!
//! The engine overwrites the slot on every tick and reads it once at startup.
//! Values are opaque JSON strings so that a corrupt entry can be detected at
//! parse time and treated as absent.

use std::sync::{Arc, Mutex};

use crate::error::DatabaseError;

pub const TIMER_STATE_KEY: &str = "timer_state";

pub trait TimerStore: Send {
    fn load(&self) -> Result<Option<String>, DatabaseError>;
    fn save(&self, json: &str) -> Result<(), DatabaseError>;
    fn clear(&self) -> Result<(), DatabaseError>;
}

/// In-memory store. Clones share the same slot, so a test can hand one clone
/// to an engine and inspect the other, or "reload" by building a second
/// engine on the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(json: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(json.into()))),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TimerStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, DatabaseError> {
        Ok(self.peek())
    }

    fn save(&self, json: &str) -> Result<(), DatabaseError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(json.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
