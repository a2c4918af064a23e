pub mod config;
pub mod task;
pub mod timer;

use std::error::Error;
use std::sync::Arc;

use serde::Serialize;
use slotclock_core::{
    Clock, CompletionRecord, Config, Database, Event, SqliteBus, SyncChannel, SystemClock,
    TaskRegistry, TimerEngine,
};

pub type CliResult = Result<(), Box<dyn Error>>;

/// Everything one invocation works on, restored from disk.
///
/// The engine gets its own connection as its state store; the second one
/// holds tasks and completions. Other processes hear about timer changes
/// through `sync`, which shares the same database file.
pub struct Context {
    pub config: Config,
    pub db: Database,
    pub timer: TimerEngine,
    pub tasks: TaskRegistry,
    pub sync: Option<SyncChannel>,
}

impl Context {
    pub fn open() -> Result<Self, Box<dyn Error>> {
        let config = Config::load_or_default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let path = Database::default_path()?;

        let store = Box::new(Database::open_at(&path)?);
        let mut timer = TimerEngine::new(config.durations(), clock.clone(), store);
        if let Some(event) = timer.restore_from_persisted() {
            tracing::debug!(?event, "restored timer");
        }

        let db = Database::open_at(&path)?;
        let tasks = TaskRegistry::from_records(clock, db.load_tasks()?);

        let sync = config.sync.enabled.then(|| {
            let bus = SqliteBus::new(path).with_poll_interval(config.poll_interval());
            SyncChannel::new(Arc::new(bus)).with_reconnect_delay(config.reconnect_delay())
        });

        Ok(Self {
            config,
            db,
            timer,
            tasks,
            sync,
        })
    }

    /// Tell running instances about the timer's new state.
    pub fn broadcast_timer(&self) {
        if let Some(sync) = &self.sync {
            sync.broadcast(self.timer.state());
        }
    }

    pub fn save_tasks(&self) -> CliResult {
        self.db.save_tasks(self.tasks.iter())?;
        Ok(())
    }
}

/// Completion history is best-effort and never fails the command.
pub fn record_completion(db: &Database, completion: &CompletionRecord) {
    if let Err(e) = db.record_completion(completion) {
        tracing::warn!(error = %e, task = %completion.task_id, "failed to record completion");
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_events(events: &[Event]) -> CliResult {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

/// `MM:SS`
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
