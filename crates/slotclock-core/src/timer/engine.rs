//! Timer engine implementation.
//!
//! The timer engine is a tick-counting state machine. It does not own a
//! thread or a runtime - the caller (usually [`crate::TimerService`]) invokes
//! `tick()` once per second while the countdown is active.
//!
//! ## State Transitions
//!
//! ```text
//! Idle(Working) -> Active(Working) -> Active(OnBreak) -> Active(Working) ...
//!                        |                  |
//!                        +--- pause --------+--> Paused (frozen)
//!                        +--- reset ------------> Idle(Working)
//! ```
//!
//! A finished session never stops the engine: the mode flips, the next
//! duration is loaded and the countdown continues. Only `pause` and `reset`
//! stop it.
//!
//! ## Persistence
//!
//! Every state change overwrites one [`TimerStore`] slot. On startup
//! `restore_from_persisted()` reads it back; if the timer was active, the
//! wall-clock time that passed while nothing was ticking is subtracted, so
//! reloading never buys extra time.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::durations::{TimerDurations, TimerMode};
use crate::clock::{whole_minutes_between, Clock};
use crate::events::Event;
use crate::storage::TimerStore;
use crate::task::TaskId;

/// The countdown state shared with other instances and written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub remaining_seconds: u64,
    pub mode: TimerMode,
    pub is_active: bool,
    pub last_persisted_at: DateTime<Utc>,
}

/// Stored form: the shared state plus the local task binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedTimer {
    #[serde(flatten)]
    state: TimerState,
    #[serde(default)]
    active_task_id: Option<TaskId>,
}

pub struct TimerEngine {
    durations: TimerDurations,
    state: TimerState,
    /// When the current session (mode) began; `None` while stopped.
    session_started_at: Option<DateTime<Utc>>,
    /// Back-reference to the task bound to this countdown.
    active_task: Option<TaskId>,
    clock: Arc<dyn Clock>,
    store: Box<dyn TimerStore>,
}

impl fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEngine")
            .field("durations", &self.durations)
            .field("state", &self.state)
            .field("session_started_at", &self.session_started_at)
            .field("active_task", &self.active_task)
            .finish_non_exhaustive()
    }
}

impl TimerEngine {
    /// Create an idle engine in Working mode with a full work session ready.
    pub fn new(
        durations: TimerDurations,
        clock: Arc<dyn Clock>,
        store: Box<dyn TimerStore>,
    ) -> Self {
        let now = clock.now();
        Self {
            state: TimerState {
                remaining_seconds: durations.work_secs(),
                mode: TimerMode::Working,
                is_active: false,
                last_persisted_at: now,
            },
            durations,
            session_started_at: None,
            active_task: None,
            clock,
            store,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn mode(&self) -> TimerMode {
        self.state.mode
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.state.remaining_seconds
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn durations(&self) -> TimerDurations {
        self.durations
    }

    pub fn active_task(&self) -> Option<&TaskId> {
        self.active_task.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// True when `task_id` is bound and its countdown is advancing.
    pub fn is_live_for(&self, task_id: &TaskId) -> bool {
        self.state.is_active && self.active_task.as_ref() == Some(task_id)
    }

    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            mode: self.state.mode,
            remaining_seconds: self.state.remaining_seconds,
            total_secs: self.durations.secs_for(self.state.mode),
            is_active: self.state.is_active,
            active_task_id: self.active_task.clone(),
            at: self.clock.now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Set durations from raw input; bad fields fall back to 25/5.
    /// Applies to future sessions only.
    pub fn configure(
        &mut self,
        work_minutes: Option<&str>,
        break_minutes: Option<&str>,
    ) -> TimerDurations {
        self.set_durations(TimerDurations::from_inputs(work_minutes, break_minutes));
        self.durations
    }

    pub fn set_durations(&mut self, durations: TimerDurations) {
        self.durations = durations;
    }

    /// Replace any running countdown with a fresh one of `duration_seconds`
    /// in the current mode.
    pub fn start(&mut self, duration_seconds: u64) -> Event {
        let now = self.clock.now();
        self.state.remaining_seconds = duration_seconds;
        self.state.is_active = true;
        self.session_started_at = Some(now);
        self.persist();
        tracing::debug!(mode = ?self.state.mode, duration_seconds, "timer started");
        Event::TimerStarted {
            mode: self.state.mode,
            duration_secs: duration_seconds,
            at: now,
        }
    }

    /// Start a full work session.
    pub fn start_work(&mut self) -> Event {
        self.state.mode = TimerMode::Working;
        self.start(self.durations.work_secs())
    }

    /// Advance the countdown by one second.
    ///
    /// Returns `None` while stopped. When the countdown reaches zero the mode
    /// flips, the new mode's full duration is loaded and `ModeChanged` is
    /// returned; the engine keeps running.
    pub fn tick(&mut self) -> Option<Event> {
        if !self.state.is_active {
            return None;
        }
        let now = self.clock.now();
        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);

        if self.state.remaining_seconds == 0 {
            let from = self.state.mode;
            let to = from.flipped();
            self.state.mode = to;
            self.state.remaining_seconds = self.durations.secs_for(to);
            self.session_started_at = Some(now);
            self.persist();
            tracing::info!(from = ?from, to = ?to, "session finished");
            return Some(Event::ModeChanged {
                from,
                to,
                remaining_seconds: self.state.remaining_seconds,
                at: now,
            });
        }

        self.persist();
        Some(Event::TimerTicked {
            mode: self.state.mode,
            remaining_seconds: self.state.remaining_seconds,
            at: now,
        })
    }

    /// Stop ticking and freeze the remaining time. `None` if already stopped.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.is_active {
            return None;
        }
        let now = self.clock.now();
        let elapsed_minutes = self
            .session_started_at
            .take()
            .map(|started| whole_minutes_between(started, now))
            .unwrap_or(0);
        self.state.is_active = false;
        self.persist();
        Some(Event::TimerPaused {
            remaining_seconds: self.state.remaining_seconds,
            elapsed_minutes,
            at: now,
        })
    }

    /// Back to an idle work session and forget the persisted record.
    pub fn reset(&mut self) -> Event {
        let now = self.clock.now();
        self.state = TimerState {
            remaining_seconds: self.durations.work_secs(),
            mode: TimerMode::Working,
            is_active: false,
            last_persisted_at: now,
        };
        self.session_started_at = None;
        self.active_task = None;
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted timer state");
        }
        Event::TimerReset { at: now }
    }

    /// Load the persisted record, if any.
    ///
    /// Missing or malformed records leave the engine untouched and return
    /// `None`. An active record loses the wall-clock seconds since it was
    /// written (floored at zero) and keeps running.
    pub fn restore_from_persisted(&mut self) -> Option<Event> {
        let raw = match self.store.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted timer state");
                return None;
            }
        };
        let persisted: PersistedTimer = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed timer state");
                return None;
            }
        };

        let now = self.clock.now();
        let mut state = persisted.state;
        let mut drift_secs = 0;
        if state.is_active {
            let whole = (now - state.last_persisted_at).num_seconds().max(0);
            drift_secs = u64::try_from(whole).unwrap_or(0);
            state.remaining_seconds = state.remaining_seconds.saturating_sub(drift_secs);
            // Only whole seconds were consumed; the fraction carries over to
            // the next restore.
            state.last_persisted_at += Duration::seconds(whole);
            // Reconstruct the session start from what is left of the session.
            let spent = self
                .durations
                .secs_for(state.mode)
                .saturating_sub(state.remaining_seconds);
            self.session_started_at =
                Some(now - Duration::seconds(i64::try_from(spent).unwrap_or(0)));
        } else {
            self.session_started_at = None;
        }

        self.state = state;
        self.active_task = persisted.active_task_id;
        if drift_secs > 0 {
            self.write_record();
        }
        tracing::debug!(drift_secs, remaining = self.state.remaining_seconds, "timer restored");

        Some(Event::TimerRestored {
            mode: self.state.mode,
            remaining_seconds: self.state.remaining_seconds,
            is_active: self.state.is_active,
            drift_secs,
            at: now,
        })
    }

    /// Take another instance's state verbatim. Last write wins.
    pub fn adopt(&mut self, incoming: &TimerState) -> Event {
        let now = self.clock.now();
        self.state.mode = incoming.mode;
        if incoming.is_active {
            self.start(incoming.remaining_seconds);
        } else {
            self.state.remaining_seconds = incoming.remaining_seconds;
            self.state.is_active = false;
            self.session_started_at = None;
            self.persist();
        }
        Event::StateAdopted {
            mode: self.state.mode,
            remaining_seconds: self.state.remaining_seconds,
            is_active: self.state.is_active,
            at: now,
        }
    }

    // ── Task binding ─────────────────────────────────────────────────

    pub(crate) fn bind_task(&mut self, task_id: TaskId) {
        self.active_task = Some(task_id);
        self.persist();
    }

    pub(crate) fn release_task(&mut self) -> Option<TaskId> {
        let released = self.active_task.take();
        if released.is_some() {
            self.persist();
        }
        released
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn persist(&mut self) {
        self.state.last_persisted_at = self.clock.now();
        self.write_record();
    }

    fn write_record(&self) {
        let record = PersistedTimer {
            state: self.state.clone(),
            active_task_id: self.active_task.clone(),
        };
        let result = serde_json::to_string(&record)
            .map_err(|e| e.to_string())
            .and_then(|json| self.store.save(&json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist timer state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
    }

    fn engine() -> (TimerEngine, Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::new();
        let engine = TimerEngine::new(
            TimerDurations::default(),
            clock.clone(),
            Box::new(store.clone()),
        );
        (engine, clock, store)
    }

    fn tick_n(engine: &mut TimerEngine, clock: &ManualClock, n: u64) -> Vec<Event> {
        (0..n)
            .filter_map(|_| {
                clock.advance_secs(1);
                engine.tick()
            })
            .collect()
    }

    #[test]
    fn new_engine_is_idle_working() {
        let (engine, _, store) = engine();
        assert_eq!(engine.mode(), TimerMode::Working);
        assert_eq!(engine.remaining_seconds(), 1500);
        assert!(!engine.is_active());
        assert!(store.peek().is_none());
    }

    #[test]
    fn tick_is_noop_while_stopped() {
        let (mut engine, _, _) = engine();
        assert!(engine.tick().is_none());
        assert_eq!(engine.remaining_seconds(), 1500);
    }

    #[test]
    fn start_persists_and_ticks_down() {
        let (mut engine, clock, store) = engine();
        engine.start(10);
        assert!(store.peek().unwrap().contains("\"is_active\":true"));

        let events = tick_n(&mut engine, &clock, 3);
        assert_eq!(engine.remaining_seconds(), 7);
        assert!(matches!(
            events.last(),
            Some(Event::TimerTicked { remaining_seconds: 7, .. })
        ));
    }

    #[test]
    fn running_out_flips_mode_exactly_once() {
        let (mut engine, clock, _) = engine();
        engine.start(4);
        let events = tick_n(&mut engine, &clock, 4);
        let flips = events
            .iter()
            .filter(|e| matches!(e, Event::ModeChanged { .. }))
            .count();
        assert_eq!(flips, 1);
        assert_eq!(engine.mode(), TimerMode::OnBreak);
        assert_eq!(engine.remaining_seconds(), 300);
        assert!(engine.is_active());
    }

    #[test]
    fn full_pomodoro_cycle() {
        let (mut engine, clock, _) = engine();
        engine.configure(Some("25"), Some("5"));
        engine.start_work();
        tick_n(&mut engine, &clock, 1500);
        assert_eq!(engine.mode(), TimerMode::OnBreak);
        assert_eq!(engine.remaining_seconds(), 300);

        tick_n(&mut engine, &clock, 300);
        assert_eq!(engine.mode(), TimerMode::Working);
        assert_eq!(engine.remaining_seconds(), 1500);
    }

    #[test]
    fn configure_with_garbage_uses_defaults() {
        let (mut engine, _, _) = engine();
        let d = engine.configure(None, Some("five"));
        assert_eq!(d, TimerDurations::default());
    }

    #[test]
    fn start_replaces_running_countdown() {
        let (mut engine, clock, _) = engine();
        engine.start(100);
        tick_n(&mut engine, &clock, 10);
        engine.start(50);
        assert_eq!(engine.remaining_seconds(), 50);
        assert!(engine.is_active());
    }

    #[test]
    fn pause_freezes_and_reports_minutes() {
        let (mut engine, clock, _) = engine();
        engine.start_work();
        tick_n(&mut engine, &clock, 150);
        let event = engine.pause().unwrap();
        assert!(matches!(
            event,
            Event::TimerPaused {
                remaining_seconds: 1350,
                elapsed_minutes: 2,
                ..
            }
        ));
        assert!(!engine.is_active());
        assert!(tick_n(&mut engine, &clock, 5).is_empty());
        assert_eq!(engine.remaining_seconds(), 1350);
        assert!(engine.pause().is_none());
    }

    #[test]
    fn reset_restores_work_and_clears_store() {
        let (mut engine, clock, store) = engine();
        engine.start(5);
        tick_n(&mut engine, &clock, 5);
        assert_eq!(engine.mode(), TimerMode::OnBreak);

        engine.reset();
        assert_eq!(engine.mode(), TimerMode::Working);
        assert_eq!(engine.remaining_seconds(), 1500);
        assert!(!engine.is_active());
        assert!(store.peek().is_none());
    }

    #[test]
    fn restore_subtracts_drift() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_value(format!(
            concat!(
                r#"{{"remaining_seconds":100,"mode":"working","is_active":true,"#,
                r#""last_persisted_at":"{}"}}"#
            ),
            t0().to_rfc3339()
        ));
        clock.advance_secs(40);
        let mut engine =
            TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store.clone()));

        let event = engine.restore_from_persisted().unwrap();
        assert!(matches!(
            event,
            Event::TimerRestored {
                remaining_seconds: 60,
                drift_secs: 40,
                is_active: true,
                ..
            }
        ));
        assert!(engine.is_active());

        clock.advance_secs(1);
        engine.tick();
        assert_eq!(engine.remaining_seconds(), 59);
    }

    #[test]
    fn rapid_reloads_still_count_down() {
        let (mut engine, clock, store) = engine();
        engine.start(100);

        for _ in 0..20 {
            clock.advance(Duration::milliseconds(900));
            let mut reloaded =
                TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store.clone()));
            reloaded.restore_from_persisted();
            engine = reloaded;
        }

        // 18 s of wall time passed across the reloads.
        assert_eq!(engine.remaining_seconds(), 82);
        assert!(engine.is_active());
    }

    #[test]
    fn restore_without_drift_leaves_record_untouched() {
        let (mut engine, clock, store) = engine();
        engine.start(100);
        let written = store.peek();

        clock.advance(Duration::milliseconds(400));
        let mut reloaded =
            TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store.clone()));
        reloaded.restore_from_persisted();
        assert_eq!(reloaded.remaining_seconds(), 100);
        assert_eq!(store.peek(), written);
    }

    #[test]
    fn restore_floors_at_zero() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_value(format!(
            concat!(
                r#"{{"remaining_seconds":30,"mode":"on_break","is_active":true,"#,
                r#""last_persisted_at":"{}"}}"#
            ),
            t0().to_rfc3339()
        ));
        clock.advance_secs(3600);
        let mut engine =
            TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store));
        engine.restore_from_persisted();
        assert_eq!(engine.remaining_seconds(), 0);

        // The next tick finishes the overdue session.
        clock.advance_secs(1);
        assert!(matches!(engine.tick(), Some(Event::ModeChanged { to: TimerMode::Working, .. })));
    }

    #[test]
    fn restore_keeps_paused_time_frozen() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_value(format!(
            concat!(
                r#"{{"remaining_seconds":100,"mode":"working","is_active":false,"#,
                r#""last_persisted_at":"{}"}}"#
            ),
            t0().to_rfc3339()
        ));
        clock.advance_secs(500);
        let mut engine =
            TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store));
        engine.restore_from_persisted();
        assert_eq!(engine.remaining_seconds(), 100);
        assert!(!engine.is_active());
    }

    #[test]
    fn malformed_record_is_ignored() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_value("{not json");
        let mut engine =
            TimerEngine::new(TimerDurations::default(), clock, Box::new(store));
        assert!(engine.restore_from_persisted().is_none());
        assert_eq!(engine.remaining_seconds(), 1500);
        assert!(!engine.is_active());
    }

    #[test]
    fn reload_round_trip_keeps_task_binding() {
        let (mut engine, clock, store) = engine();
        engine.bind_task(TaskId::from("task-a"));
        engine.start_work();
        tick_n(&mut engine, &clock, 30);

        clock.advance_secs(10);
        let mut reloaded =
            TimerEngine::new(TimerDurations::default(), clock.clone(), Box::new(store));
        reloaded.restore_from_persisted();
        assert_eq!(reloaded.active_task(), Some(&TaskId::from("task-a")));
        assert_eq!(reloaded.remaining_seconds(), 1500 - 30 - 10);
    }

    #[test]
    fn adopt_starts_when_incoming_is_active() {
        let (mut engine, clock, _) = engine();
        let incoming = TimerState {
            remaining_seconds: 42,
            mode: TimerMode::OnBreak,
            is_active: true,
            last_persisted_at: clock.now(),
        };
        engine.adopt(&incoming);
        assert!(engine.is_active());
        assert_eq!(engine.mode(), TimerMode::OnBreak);
        assert_eq!(engine.remaining_seconds(), 42);
    }

    #[test]
    fn adopt_freezes_when_incoming_is_paused() {
        let (mut engine, clock, _) = engine();
        engine.start_work();
        let incoming = TimerState {
            remaining_seconds: 900,
            mode: TimerMode::Working,
            is_active: false,
            last_persisted_at: clock.now(),
        };
        engine.adopt(&incoming);
        assert!(!engine.is_active());
        assert_eq!(engine.remaining_seconds(), 900);
    }
}
