//! Transport between processes that share one SQLite file.
//!
//! Publishing appends to the `sync_messages` table. Each subscription polls
//! for rows newer than the last one it saw and forwards them on a broadcast
//! channel; a failed poll closes that channel so the listener reconnects.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use super::transport::{SyncMessage, SyncTransport};
use crate::error::{DatabaseError, SyncError};
use crate::storage::Database;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

const SUBSCRIPTION_CAPACITY: usize = 64;

pub struct SqliteBus {
    path: PathBuf,
    poll_interval: Duration,
    writer: Mutex<Option<Database>>,
}

impl fmt::Debug for SqliteBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBus")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl SqliteBus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            writer: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `f` on the publishing connection, opening it on first use and
    /// dropping it after a failure.
    fn with_writer<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, DatabaseError>,
    ) -> Result<T, SyncError> {
        let mut slot = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(Database::open_at(&self.path).map_err(storage)?);
        }
        let Some(db) = slot.as_ref() else {
            return Err(SyncError::Closed);
        };
        let result = f(db);
        if result.is_err() {
            slot.take();
        }
        result.map_err(storage)
    }
}

impl SyncTransport for SqliteBus {
    fn publish(&self, message: SyncMessage) -> Result<(), SyncError> {
        self.with_writer(|db| db.publish_sync(&message)).map(|_| ())
    }

    /// Needs a Tokio runtime for the polling task.
    fn subscribe(&self) -> Result<broadcast::Receiver<SyncMessage>, SyncError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::Closed)?;
        let db = Database::open_at(&self.path).map_err(storage)?;
        let mut last_seen = db.latest_sync_id().map_err(storage)?;
        let (tx, rx) = broadcast::channel(SUBSCRIPTION_CAPACITY);
        let poll_interval = self.poll_interval;

        runtime.spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.receiver_count() == 0 {
                    break;
                }
                match db.sync_messages_after(last_seen) {
                    Ok(messages) => {
                        for (id, message) in messages {
                            last_seen = id;
                            let _ = tx.send(message);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "sync poll failed, closing subscription");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn storage(err: DatabaseError) -> SyncError {
    SyncError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncChannel;
    use crate::timer::{TimerMode, TimerState};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn state(remaining_seconds: u64) -> TimerState {
        TimerState {
            remaining_seconds,
            mode: TimerMode::Working,
            is_active: true,
            last_persisted_at: Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn separate_connections_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotclock.db");
        let a = SyncChannel::new(Arc::new(SqliteBus::new(&path)));
        let b = SyncChannel::new(Arc::new(SqliteBus::new(&path)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _listener = b.on_receive(move |m| sink.lock().unwrap().push(m.state.remaining_seconds));
        tokio::time::sleep(Duration::from_millis(10)).await;

        a.broadcast(&state(42));
        b.broadcast(&state(7));
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;

        // b skips its own message.
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_starts_after_existing_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotclock.db");
        let a = SyncChannel::new(Arc::new(SqliteBus::new(&path)));
        a.broadcast(&state(1));

        let bus = SqliteBus::new(&path);
        let mut rx = bus.subscribe().unwrap();
        a.broadcast(&state(2));
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;

        assert_eq!(rx.try_recv().unwrap().state.remaining_seconds, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_prunes_old_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotclock.db");
        let bus = SqliteBus::new(&path);
        for n in 0..100 {
            bus.publish(SyncMessage {
                origin: uuid::Uuid::new_v4(),
                state: state(n),
            })
            .unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let rows = db.sync_messages_after(0).unwrap();
        assert_eq!(rows.len(), 64);
        assert_eq!(rows.last().unwrap().1.state.remaining_seconds, 99);
    }

    #[test]
    fn subscribe_outside_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bus = SqliteBus::new(dir.path().join("slotclock.db"));
        assert_eq!(bus.subscribe().err(), Some(SyncError::Closed));
    }
}
