mod config;
pub mod database;
mod state_store;

pub use config::{Config, NotificationsConfig, SyncConfig, TimerConfig};
pub use database::Database;
pub use state_store::{MemoryStore, TimerStore, TIMER_STATE_KEY};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `SLOTCLOCK_DATA_DIR` wins when set. Otherwise `~/.config/slotclock`, or
/// `~/.config/slotclock-dev` when `SLOTCLOCK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("SLOTCLOCK_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SLOTCLOCK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("slotclock-dev")
            } else {
                base_dir.join("slotclock")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
