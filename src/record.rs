// src/record.rs

//! Persisted shape of a run: the schema written to the state store and
//! handed back to callers awaiting completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::task::TaskName;

/// Lifecycle status of an entire run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Lifecycle status of a single task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never attempted because an upstream dependency failed or was
    /// cancelled.
    Skipped,
    Cancelled,
}

/// The closed set of error kinds observable in a persisted
/// `TaskRecord.error`. Mirrors the task-level variants of
/// [`crate::error::MicroflowError`] one-for-one; see
/// [`crate::error::MicroflowError::as_task_error`] for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TaskUser,
    TaskTimeout,
    TaskCancelled,
    Serialization,
}

/// The last error recorded against a task: a closed `kind` plus a
/// human-readable `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-task bookkeeping persisted alongside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: TaskName,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<TaskError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(name: TaskName) -> Self {
        Self {
            name,
            status: TaskStatus::Pending,
            attempts: 0,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// The full persisted state of one workflow run.
///
/// Loaded and saved wholesale by a [`crate::store::StateStore`] under a
/// single `run_id` key — see that module for the atomicity contract this
/// type relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    pub ctx: Context,
    pub tasks: Vec<TaskRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(run_id: String, workflow_name: String, task_names: Vec<TaskName>, ctx: Context) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            workflow_name,
            status: RunStatus::Pending,
            ctx,
            tasks: task_names.into_iter().map(TaskRecord::pending).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.name == name)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// What a caller awaiting `Scheduler::run` gets back: the final record plus
/// a convenience flag mirroring `status == Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run: Run,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.run.status == RunStatus::Completed
    }
}
