// src/error.rs

//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::record::{ErrorKind, TaskError};
use crate::task::TaskName;

/// The closed set of error kinds a run can surface.
#[derive(Error, Debug)]
pub enum MicroflowError {
    /// The DAG is invalid (cycle, duplicate name, unknown dep) or a
    /// `TaskSpec`/`RunnerConfig` option is out of range. Raised at build
    /// time, before any state is written.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A task's `fn` raised. Carries the task name, the attempt index, and
    /// the original message. Subject to retry.
    #[error("task '{task}' failed on attempt {attempt}: {message}")]
    TaskUserError {
        task: TaskName,
        attempt: u32,
        message: String,
    },

    /// A task's per-attempt deadline was exceeded. Subject to retry.
    #[error("task '{task}' timed out on attempt {attempt} after {timeout_s}s")]
    TaskTimeoutError {
        task: TaskName,
        attempt: u32,
        timeout_s: f64,
    },

    /// Cooperative cancellation was observed for this task. Not retried.
    #[error("task '{task}' was cancelled")]
    TaskCancelledError { task: TaskName },

    /// A state-store or queue persistence operation failed. Internally
    /// retried a fixed number of times before escalating.
    #[error("store error: {0}")]
    StoreError(String),

    /// A task returned a value that is not JSON-representable. Not
    /// retried; the task is marked failed immediately.
    #[error("task '{task}' produced a non-serializable output: {message}")]
    SerializationError { task: TaskName, message: String },

    #[error("queue error: {0}")]
    QueueError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MicroflowError {
    /// Projects a task-level variant onto the closed `kind`/`message` pair
    /// persisted in a [`crate::record::TaskRecord`]. Only the four variants
    /// that originate from a single task attempt have a record
    /// representation; this is always called with one of those.
    pub fn as_task_error(&self) -> TaskError {
        match self {
            Self::TaskUserError { message, .. } => TaskError {
                kind: ErrorKind::TaskUser,
                message: message.clone(),
            },
            Self::TaskTimeoutError { timeout_s, .. } => TaskError {
                kind: ErrorKind::TaskTimeout,
                message: format!("timed out after {timeout_s}s"),
            },
            Self::TaskCancelledError { task } => TaskError {
                kind: ErrorKind::TaskCancelled,
                message: format!("task '{task}' was cancelled"),
            },
            Self::SerializationError { message, .. } => TaskError {
                kind: ErrorKind::Serialization,
                message: message.clone(),
            },
            other => TaskError {
                kind: ErrorKind::TaskUser,
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, MicroflowError>;
