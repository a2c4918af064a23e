//! Single-active-task bookkeeping.
//!
//! The registry owns every [`TaskRecord`]; the timer engine only holds a
//! back-reference to the task it is counting for. At most one task has an
//! open accounting segment at any time, and that task is the one bound to
//! the engine. Starting a task closes any other open segment first.
//!
//! All updates are applied eagerly in memory. Writing the results anywhere
//! is the caller's business and never gates a transition.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{CompletionRecord, Slot, TaskId, TaskRecord, TaskReport, TaskStatus};
use crate::clock::{whole_minutes_between, Clock};
use crate::error::TaskError;
use crate::events::Event;
use crate::timer::TimerEngine;

#[derive(Debug)]
pub struct TaskRegistry {
    tasks: IndexMap<TaskId, TaskRecord>,
    clock: Arc<dyn Clock>,
}

impl TaskRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: IndexMap::new(),
            clock,
        }
    }

    /// Rebuild from stored records, keeping their order.
    pub fn from_records(
        clock: Arc<dyn Clock>,
        records: impl IntoIterator<Item = TaskRecord>,
    ) -> Self {
        let tasks = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self { tasks, clock }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, task_id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(task_id)
    }

    /// Records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The task whose clock is running, if any.
    pub fn active_id(&self) -> Option<&TaskId> {
        self.tasks
            .values()
            .find(|t| t.segment_started_at.is_some())
            .map(|t| &t.id)
    }

    /// The active task, only if the engine is bound to it and ticking.
    pub fn live_task(&self, timer: &TimerEngine) -> Option<&TaskRecord> {
        self.active_id()
            .filter(|id| timer.is_live_for(id))
            .and_then(|id| self.tasks.get(id))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Add a NotStarted task. Duplicate ids are rejected.
    ///
    /// # Errors
    /// `AlreadyRegistered` for a known id, `EmptyAllotment` for zero minutes.
    pub fn register(
        &mut self,
        task_id: TaskId,
        description: impl Into<String>,
        allotted_minutes: u32,
    ) -> Result<Event, TaskError> {
        self.insert(TaskRecord::new(
            task_id,
            description,
            allotted_minutes,
            self.clock.now(),
        ))
    }

    /// Book a slot: generate an id and derive the allotment from the slot.
    ///
    /// # Errors
    /// `EmptyAllotment` when the slot rounds down to zero minutes.
    pub fn book(
        &mut self,
        slot: Slot,
        description: impl Into<String>,
    ) -> Result<(TaskId, Event), TaskError> {
        let task_id = TaskId::generate();
        let mut record = TaskRecord::new(
            task_id.clone(),
            description,
            slot.allotted_minutes(),
            self.clock.now(),
        );
        record.slot = Some(slot);
        let event = self.insert(record)?;
        Ok((task_id, event))
    }

    /// Make `task_id` the one running task and start a work session for it.
    ///
    /// Any other task with a live clock is paused first. Starting the task
    /// that is already live does nothing.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `AlreadyCompleted` for finished tasks.
    pub fn start(
        &mut self,
        timer: &mut TimerEngine,
        task_id: &TaskId,
    ) -> Result<Vec<Event>, TaskError> {
        let record = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;
        if record.is_completed() {
            return Err(TaskError::AlreadyCompleted(task_id.clone()));
        }
        if record.segment_started_at.is_some() && timer.is_live_for(task_id) {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let open: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.segment_started_at.is_some())
            .map(|t| t.id.clone())
            .collect();
        for other in open {
            events.extend(self.close_segment(timer, &other));
        }

        let now = self.clock.now();
        if let Some(record) = self.tasks.get_mut(task_id) {
            record.status = TaskStatus::InProgress;
            record.segment_started_at = Some(now);
        }
        timer.bind_task(task_id.clone());
        events.push(Event::TaskStarted {
            task_id: task_id.clone(),
            at: now,
        });
        events.push(timer.start_work());
        tracing::debug!(task = %task_id, "task started");
        Ok(events)
    }

    /// Stop the active task's clock and bank its minutes.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `NotActive` if `task_id` is not running.
    pub fn pause(
        &mut self,
        timer: &mut TimerEngine,
        task_id: &TaskId,
    ) -> Result<Vec<Event>, TaskError> {
        let record = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;
        if record.segment_started_at.is_none() {
            return Err(TaskError::NotActive {
                task_id: task_id.clone(),
                active: self.active_id().cloned(),
            });
        }
        Ok(self.close_segment(timer, task_id))
    }

    /// Mark a task done, pausing it first if it is running. Terminal.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `AlreadyCompleted` if already done.
    pub fn complete(
        &mut self,
        timer: &mut TimerEngine,
        task_id: &TaskId,
    ) -> Result<(CompletionRecord, Vec<Event>), TaskError> {
        let record = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;
        if record.is_completed() {
            return Err(TaskError::AlreadyCompleted(task_id.clone()));
        }

        let mut events = Vec::new();
        if record.segment_started_at.is_some() {
            events.extend(self.close_segment(timer, task_id));
        }

        let now = self.clock.now();
        let record = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;
        record.status = TaskStatus::Completed;
        record.completed_at = Some(now);

        let completion = CompletionRecord {
            task_id: task_id.clone(),
            elapsed_minutes: record.elapsed_minutes,
            allotted_minutes: record.allotted_minutes,
            completed: true,
            timestamp: now,
        };
        events.push(Event::TaskCompleted {
            task_id: task_id.clone(),
            elapsed_minutes: record.elapsed_minutes,
            allotted_minutes: record.allotted_minutes,
            at: now,
        });
        Ok((completion, events))
    }

    /// Elapsed over allotted minutes, open segment included. Not clamped.
    ///
    /// # Errors
    /// `NotFound` for unknown ids.
    pub fn report_elapsed(&self, task_id: &TaskId) -> Result<f64, TaskError> {
        self.report(task_id).map(|r| r.ratio)
    }

    /// # Errors
    /// `NotFound` for unknown ids.
    pub fn report(&self, task_id: &TaskId) -> Result<TaskReport, TaskError> {
        let record = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;
        let open = record
            .segment_started_at
            .map(|started| whole_minutes_between(started, self.clock.now()))
            .unwrap_or(0);
        let elapsed = record.elapsed_minutes.saturating_add(open);
        let ratio = if record.allotted_minutes == 0 {
            0.0
        } else {
            f64::from(elapsed) / f64::from(record.allotted_minutes)
        };
        Ok(TaskReport {
            task_id: record.id.clone(),
            status: record.status,
            elapsed_minutes: elapsed,
            allotted_minutes: record.allotted_minutes,
            ratio,
            label: format!("{elapsed}/{}", record.allotted_minutes),
        })
    }

    /// Pause the running task (if any), then reset the engine.
    pub fn reset_timer(&mut self, timer: &mut TimerEngine) -> Vec<Event> {
        let mut events = match self.active_id().cloned() {
            Some(active) => self.close_segment(timer, &active),
            None => Vec::new(),
        };
        events.push(timer.reset());
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn insert(&mut self, record: TaskRecord) -> Result<Event, TaskError> {
        if self.tasks.contains_key(&record.id) {
            return Err(TaskError::AlreadyRegistered(record.id));
        }
        if record.allotted_minutes == 0 {
            return Err(TaskError::EmptyAllotment(record.id));
        }
        let event = Event::TaskRegistered {
            task_id: record.id.clone(),
            allotted_minutes: record.allotted_minutes,
            at: record.created_at,
        };
        self.tasks.insert(record.id.clone(), record);
        Ok(event)
    }

    /// Bank the open segment of `task_id` and detach it from the engine.
    fn close_segment(&mut self, timer: &mut TimerEngine, task_id: &TaskId) -> Vec<Event> {
        let now = self.clock.now();
        let mut events = Vec::new();

        if timer.active_task() == Some(task_id) {
            timer.release_task();
            events.extend(timer.pause());
        }

        if let Some(record) = self.tasks.get_mut(task_id) {
            if let Some(started) = record.segment_started_at.take() {
                let minutes = whole_minutes_between(started, now);
                record.elapsed_minutes = record.elapsed_minutes.saturating_add(minutes);
            }
            events.push(Event::TaskPaused {
                task_id: task_id.clone(),
                elapsed_minutes: record.elapsed_minutes,
                at: now,
            });
        }
        events
    }
}
