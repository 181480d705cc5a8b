#![allow(dead_code)]

//! In-memory [`StateStore`]/[`Queue`] test doubles.
//!
//! Grounded on the same idea as a `FakeExecutor`: a minimal implementation
//! of the production trait, backed by a `Mutex`-guarded
//! `Vec`/`HashMap` instead of real IO, so scheduler and runner tests run
//! deterministically without a filesystem or a Redis instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use microflow::{Context, Message, MessageId, MicroflowError, Queue, Run, StateStore, TaskRecord};

/// In-memory [`StateStore`] keyed by `run_id`. Every method takes the same
/// lock, so unlike [`microflow::store::FileStateStore`] there is no
/// per-run concurrency — fine for tests, wrong for production.
#[derive(Default)]
pub struct FakeStateStore {
    runs: Mutex<HashMap<String, Run>>,
}

impl FakeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous snapshot accessor for assertions.
    pub fn snapshot(&self, run_id: &str) -> Option<Run> {
        self.runs.lock().unwrap().get(run_id).cloned()
    }
}

#[async_trait]
impl StateStore for FakeStateStore {
    async fn load_run(&self, run_id: &str) -> Result<Option<Run>, MicroflowError> {
        Ok(self.runs.lock().unwrap().get(run_id).cloned())
    }

    async fn save_run(&self, run: &Run) -> Result<(), MicroflowError> {
        self.runs
            .lock()
            .unwrap()
            .insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn update_ctx(&self, run_id: &str, delta: Context) -> Result<(), MicroflowError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| MicroflowError::StoreError(format!("no such run '{run_id}'")))?;
        microflow::merge_context(&mut run.ctx, delta);
        run.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn upsert_task(&self, run_id: &str, task: TaskRecord) -> Result<(), MicroflowError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| MicroflowError::StoreError(format!("no such run '{run_id}'")))?;
        if let Some(existing) = run.task_mut(&task.name) {
            *existing = task;
        } else {
            run.tasks.push(task);
        }
        run.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<String>, MicroflowError> {
        let mut ids: Vec<String> = self.runs.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// In-memory [`Queue`] with no visibility-timeout redelivery: `consume`
/// pops and immediately forgets, and `ack` is a no-op. Sufficient for
/// tests that only exercise publish/consume ordering.
#[derive(Default)]
pub struct FakeQueue {
    messages: Mutex<VecDeque<Message>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for FakeQueue {
    async fn publish(&self, message: Message) -> Result<(), MicroflowError> {
        self.messages.lock().unwrap().push_back(message);
        Ok(())
    }

    async fn consume(&self, _block_timeout_s: f64) -> Result<Option<Message>, MicroflowError> {
        Ok(self.messages.lock().unwrap().pop_front())
    }

    async fn ack(&self, _id: MessageId) -> Result<(), MicroflowError> {
        Ok(())
    }
}
