// src/store/mod.rs

//! Durable, process-external state for runs.
//!
//! A [`StateStore`] is the single source of truth for "has this task
//! executed" and "what does the run's context look like right now" — the
//! scheduler holds no state of its own beyond one in-flight run. Every
//! mutating method must be atomic per `run_id`: concurrent callers (a
//! retried attempt racing a cancellation, two `WorkflowRunner`s sharing a
//! Redis-backed store) must never observe a half-applied update.

mod file;
mod redis_store;

pub use file::FileStateStore;
pub use redis_store::RedisStateStore;

use async_trait::async_trait;

use crate::error::MicroflowError;
use crate::record::{Run, TaskRecord};

/// Durable storage contract for [`Run`] documents.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a run by id, or `None` if it has never been created.
    async fn load_run(&self, run_id: &str) -> Result<Option<Run>, MicroflowError>;

    /// Persist a run wholesale, overwriting any prior document.
    async fn save_run(&self, run: &Run) -> Result<(), MicroflowError>;

    /// Atomically merge `delta` into the run's context and bump
    /// `updated_at`. Returns the resulting context-free run status check
    /// is left to the caller via a subsequent `load_run`, keeping this
    /// call's payload small under the Redis backend's CAS loop.
    async fn update_ctx(
        &self,
        run_id: &str,
        delta: crate::context::Context,
    ) -> Result<(), MicroflowError>;

    /// Atomically overwrite one task's record within a run.
    async fn upsert_task(&self, run_id: &str, task: TaskRecord) -> Result<(), MicroflowError>;

    /// List every run id known to the store. Intended for operational
    /// inspection and tests, not the scheduler's hot path.
    async fn list_runs(&self) -> Result<Vec<String>, MicroflowError>;
}

/// Shared helper: apply a task-record update to a loaded run in memory,
/// used by both backends so the merge semantics live in one place.
pub(crate) fn apply_task_upsert(run: &mut Run, task: TaskRecord) {
    if let Some(existing) = run.task_mut(&task.name) {
        *existing = task;
    } else {
        run.tasks.push(task);
    }
}
