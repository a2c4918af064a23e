//! Async driver for one timer engine and its task registry.
//!
//! The service owns the once-per-second [`Ticker`], fans every [`Event`] out
//! to subscribers, turns mode changes into notifications and keeps the
//! optional [`SyncChannel`] fed in both directions.
//!
//! All state changes happen synchronously under one lock and are visible
//! immediately; nothing here waits on persistence or on other instances.
//! Every method that can start a countdown must run inside a Tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::TaskError;
use crate::events::Event;
use crate::notify::Notifier;
use crate::sync::{SyncChannel, SyncListener, SyncMessage};
use crate::task::{CompletionRecord, Slot, TaskId, TaskRegistry};
use crate::timer::{Ticker, TimerDurations, TimerEngine};

const TICK_PERIOD: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 256;

/// The engine and the registry, always locked together.
#[derive(Debug)]
pub struct Core {
    pub timer: TimerEngine,
    pub tasks: TaskRegistry,
}

#[derive(Clone)]
pub struct TimerService {
    shared: Arc<Shared>,
}

struct Shared {
    core: Mutex<Core>,
    ticker: Mutex<Option<Ticker>>,
    listener: Mutex<Option<SyncListener>>,
    events: broadcast::Sender<Event>,
    notifier: Arc<dyn Notifier>,
    sync: Option<SyncChannel>,
}

/// What a command did to the countdown.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Countdown {
    Restarted,
    Unchanged,
}

impl TimerService {
    pub fn new(
        timer: TimerEngine,
        tasks: TaskRegistry,
        notifier: Arc<dyn Notifier>,
        sync: Option<SyncChannel>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core { timer, tasks }),
                ticker: Mutex::new(None),
                listener: Mutex::new(None),
                events,
                notifier,
                sync,
            }),
        }
    }

    /// Start listening to other instances and resume ticking if the engine
    /// came back active from storage.
    pub fn activate(&self) {
        if let Some(sync) = &self.shared.sync {
            let weak = Arc::downgrade(&self.shared);
            let listener = sync.on_receive(move |message| {
                if let Some(shared) = weak.upgrade() {
                    Shared::adopt(&shared, &message);
                }
            });
            *lock(&self.shared.listener) = Some(listener);
        }
        if self.with_core(|core| core.timer.is_active()) {
            Shared::restart_ticker(&self.shared);
        }
    }

    /// Stop ticking and listening. The engine state is left as is.
    pub fn shutdown(&self) {
        if let Some(mut ticker) = lock(&self.shared.ticker).take() {
            ticker.cancel();
        }
        if let Some(mut listener) = lock(&self.shared.listener).take() {
            listener.cancel();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// Read access to the engine and the registry.
    pub fn with_core<R>(&self, f: impl FnOnce(&Core) -> R) -> R {
        f(&lock(&self.shared.core))
    }

    pub fn is_ticking(&self) -> bool {
        lock(&self.shared.ticker)
            .as_ref()
            .is_some_and(Ticker::is_running)
    }

    // ── Timer commands ───────────────────────────────────────────────

    pub fn configure(
        &self,
        work_minutes: Option<&str>,
        break_minutes: Option<&str>,
    ) -> TimerDurations {
        lock(&self.shared.core).timer.configure(work_minutes, break_minutes)
    }

    pub fn start_timer(&self, duration_seconds: u64) -> Event {
        let event = lock(&self.shared.core).timer.start(duration_seconds);
        self.finish(vec![event.clone()], Countdown::Restarted);
        event
    }

    pub fn pause_timer(&self) -> Option<Event> {
        let event = lock(&self.shared.core).timer.pause();
        self.finish(event.iter().cloned().collect(), Countdown::Unchanged);
        event
    }

    /// Reset the engine, banking the running task's minutes first.
    pub fn reset(&self) -> Vec<Event> {
        let events = {
            let mut core = lock(&self.shared.core);
            let Core { timer, tasks } = &mut *core;
            tasks.reset_timer(timer)
        };
        self.finish(events.clone(), Countdown::Unchanged);
        events
    }

    // ── Task commands ────────────────────────────────────────────────

    /// # Errors
    /// See [`TaskRegistry::register`].
    pub fn register_task(
        &self,
        task_id: TaskId,
        description: &str,
        allotted_minutes: u32,
    ) -> Result<Event, TaskError> {
        let event = lock(&self.shared.core)
            .tasks
            .register(task_id, description, allotted_minutes)?;
        self.emit(&event);
        Ok(event)
    }

    /// # Errors
    /// See [`TaskRegistry::book`].
    pub fn book_task(&self, slot: Slot, description: &str) -> Result<TaskId, TaskError> {
        let (task_id, event) = lock(&self.shared.core).tasks.book(slot, description)?;
        self.emit(&event);
        Ok(task_id)
    }

    /// # Errors
    /// See [`TaskRegistry::start`].
    pub fn start_task(&self, task_id: &TaskId) -> Result<Vec<Event>, TaskError> {
        let events = {
            let mut core = lock(&self.shared.core);
            let Core { timer, tasks } = &mut *core;
            tasks.start(timer, task_id)?
        };
        let countdown = if events.is_empty() {
            Countdown::Unchanged
        } else {
            Countdown::Restarted
        };
        self.finish(events.clone(), countdown);
        Ok(events)
    }

    /// # Errors
    /// See [`TaskRegistry::pause`].
    pub fn pause_task(&self, task_id: &TaskId) -> Result<Vec<Event>, TaskError> {
        let events = {
            let mut core = lock(&self.shared.core);
            let Core { timer, tasks } = &mut *core;
            tasks.pause(timer, task_id)?
        };
        self.finish(events.clone(), Countdown::Unchanged);
        Ok(events)
    }

    /// # Errors
    /// See [`TaskRegistry::complete`].
    pub fn complete_task(&self, task_id: &TaskId) -> Result<CompletionRecord, TaskError> {
        let (completion, events) = {
            let mut core = lock(&self.shared.core);
            let Core { timer, tasks } = &mut *core;
            tasks.complete(timer, task_id)?
        };
        self.finish(events, Countdown::Unchanged);
        Ok(completion)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn emit(&self, event: &Event) {
        Shared::emit(&self.shared, event);
    }

    fn finish(&self, events: Vec<Event>, countdown: Countdown) {
        for event in &events {
            self.emit(event);
        }
        if events.is_empty() {
            return;
        }
        Shared::broadcast_state(&self.shared);
        let active = self.with_core(|core| core.timer.is_active());
        match (active, countdown) {
            (true, Countdown::Restarted) => Shared::restart_ticker(&self.shared),
            (true, Countdown::Unchanged) => Shared::ensure_ticker(&self.shared),
            (false, _) => Shared::stop_ticker(&self.shared),
        }
    }
}

impl Shared {
    fn emit(&self, event: &Event) {
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
    }

    fn broadcast_state(&self) {
        if let Some(sync) = &self.sync {
            let state = lock(&self.core).timer.state().clone();
            sync.broadcast(&state);
        }
    }

    fn on_tick(&self) {
        let event = lock(&self.core).timer.tick();
        let Some(event) = event else {
            return;
        };
        self.emit(&event);
        if let Event::ModeChanged { from, to, .. } = event {
            self.notifier.mode_changed(from, to);
            self.broadcast_state();
        }
    }

    fn adopt(this: &Arc<Self>, message: &SyncMessage) {
        let (event, active) = {
            let mut core = lock(&this.core);
            let event = core.timer.adopt(&message.state);
            (event, core.timer.is_active())
        };
        tracing::debug!(origin = %message.origin, active, "adopted remote timer state");
        this.emit(&event);
        if active {
            Self::restart_ticker(this);
        } else {
            Self::stop_ticker(this);
        }
    }

    fn restart_ticker(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        let ticker = Ticker::spawn(TICK_PERIOD, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_tick();
            }
        });
        // Replacing the old ticker drops and cancels it.
        *lock(&this.ticker) = Some(ticker);
    }

    fn ensure_ticker(this: &Arc<Self>) {
        let running = lock(&this.ticker).as_ref().is_some_and(Ticker::is_running);
        if !running {
            Self::restart_ticker(this);
        }
    }

    fn stop_ticker(this: &Arc<Self>) {
        if let Some(mut ticker) = lock(&this.ticker).take() {
            ticker.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
