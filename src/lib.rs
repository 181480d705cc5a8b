// src/lib.rs

//! Deterministic DAG workflow engine.
//!
//! A [`Workflow`] is a validated set of [`TaskSpec`]s wired together with
//! `depends_on`/`>>`. A [`WorkflowRunner`] executes runs of that workflow
//! against a durable [`StateStore`], optionally pulling run requests off a
//! [`Queue`]. Task outputs merge into a run-scoped [`Context`] that later
//! tasks read from.
//!
//! ```ignore
//! use microflow::{task, Workflow, WorkflowRunner};
//! use microflow::config::RunnerConfig;
//! use microflow::store::FileStateStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let fetch = task("fetch", |_ctx| async { Ok(Some(json!({"n": 1}))) });
//! let double = task("double", |ctx| async move {
//!     let n = ctx.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(Some(json!({"n": n * 2})))
//! })
//! .depends_on("fetch");
//!
//! let workflow = Workflow::try_new(vec![fetch, double]).unwrap();
//! let store = Arc::new(FileStateStore::new("./data"));
//! let runner = WorkflowRunner::new(workflow, store, &RunnerConfig::from_env());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod queue;
pub mod record;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod workflow;

pub use context::{merge_context, Context};
pub use error::{MicroflowError, Result};
pub use events::{Event, EventSink};
pub use queue::{Message, MessageId, Queue};
pub use record::{ErrorKind, Run, RunResult, RunStatus, TaskError, TaskRecord, TaskStatus};
pub use runner::WorkflowRunner;
pub use scheduler::Scheduler;
pub use store::StateStore;
pub use task::{edge, task, TaskFn, TaskName, TaskSpec};
pub use workflow::Workflow;
