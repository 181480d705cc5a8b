// src/events.rs

//! Observable lifecycle events a [`crate::scheduler::Scheduler`] emits as a
//! run progresses.
//!
//! These are informational only — nothing downstream of the scheduler
//! depends on an event being observed, so a slow or absent subscriber never
//! affects run correctness. Grounded on a `RuntimeEvent` broadcast used to
//! drive a progress UI.

use chrono::{DateTime, Utc};

use crate::task::TaskName;

/// One observable occurrence during a run.
#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        run_id: String,
        at: DateTime<Utc>,
    },
    TaskStarted {
        run_id: String,
        task: TaskName,
        attempt: u32,
        at: DateTime<Utc>,
    },
    TaskSucceeded {
        run_id: String,
        task: TaskName,
        attempt: u32,
        at: DateTime<Utc>,
    },
    TaskRetrying {
        run_id: String,
        task: TaskName,
        attempt: u32,
        backoff_s: f64,
        reason: String,
    },
    TaskFailed {
        run_id: String,
        task: TaskName,
        attempt: u32,
        reason: String,
    },
    TaskSkipped {
        run_id: String,
        task: TaskName,
        upstream: TaskName,
    },
    TaskCancelled {
        run_id: String,
        task: TaskName,
    },
    RunFinished {
        run_id: String,
        status: crate::record::RunStatus,
        at: DateTime<Utc>,
    },
}

/// Sink a [`Scheduler`](crate::scheduler::Scheduler) publishes [`Event`]s
/// to. A `tokio::sync::broadcast::Sender<Event>` satisfies this trivially;
/// the trait exists so tests can swap in a `Vec`-collecting sink without
/// pulling in the broadcast machinery.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl EventSink for tokio::sync::broadcast::Sender<Event> {
    fn emit(&self, event: Event) {
        // No subscribers is not an error: events are best-effort.
        let _ = self.send(event);
    }
}

/// An [`EventSink`] that discards everything. The default when a caller has
/// no use for run telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}
