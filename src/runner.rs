// src/runner.rs

//! [`WorkflowRunner`]: the top-level entry point tying a [`Workflow`], a
//! [`StateStore`], and an optional [`Queue`] together under the
//! concurrency caps in [`RunnerConfig`].
//!
//! This is the IO shell around [`Scheduler`] the way `engine/runtime.rs`
//! is the IO shell around a `CoreRuntime`: it owns the semaphores and the
//! queue-consumption loop; [`Scheduler`] owns one run's actual execution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::context::Context;
use crate::error::MicroflowError;
use crate::events::{EventSink, NullSink};
use crate::queue::{Message, Queue};
use crate::record::RunResult;
use crate::scheduler::Scheduler;
use crate::store::StateStore;
use crate::workflow::Workflow;

/// The body of a [`Message`] a [`WorkflowRunner`] expects when consuming
/// run requests off a [`Queue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    #[serde(default)]
    pub initial_ctx: Context,
}

/// Submits and executes workflow runs under a shared concurrency budget.
pub struct WorkflowRunner {
    workflow: Arc<Workflow>,
    store: Arc<dyn StateStore>,
    queue: Option<Arc<dyn Queue>>,
    events: Arc<dyn EventSink>,
    workflow_semaphore: Option<Arc<Semaphore>>,
    /// Shared process-wide cap on concurrent task executions, handed to
    /// every `Scheduler` this runner builds so the limit holds across runs
    /// executing concurrently, not just within one.
    task_semaphore: Option<Arc<Semaphore>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl WorkflowRunner {
    pub fn new(workflow: Workflow, store: Arc<dyn StateStore>, config: &RunnerConfig) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            workflow: Arc::new(workflow),
            store,
            queue: None,
            events: Arc::new(NullSink),
            workflow_semaphore: config
                .effective_max_concurrent_workflows()
                .map(|n| Arc::new(Semaphore::new(n))),
            task_semaphore: config
                .effective_max_concurrent_tasks()
                .map(|n| Arc::new(Semaphore::new(n))),
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Request cooperative cancellation of every run this runner is
    /// currently executing. Already-running task attempts finish (or time
    /// out) on their own; nothing new is started.
    pub fn cancel_all(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Run `run_id` to completion directly, bypassing the queue. Useful
    /// for callers driving a single run synchronously, and for tests.
    pub async fn submit(
        &self,
        run_id: String,
        initial_ctx: Context,
    ) -> Result<RunResult, MicroflowError> {
        let _permit = match &self.workflow_semaphore {
            Some(sem) => Some(sem.clone().acquire_owned().await.map_err(|e| {
                MicroflowError::Other(anyhow::anyhow!("workflow semaphore closed: {e}"))
            })?),
            None => None,
        };

        let mut scheduler = Scheduler::new(self.store.clone()).with_events(self.events.clone());
        if let Some(sem) = &self.task_semaphore {
            scheduler = scheduler.with_task_semaphore(sem.clone());
        }

        scheduler
            .run(
                self.workflow.clone(),
                run_id,
                initial_ctx,
                self.cancel_rx.clone(),
            )
            .await
    }

    /// Consume [`RunRequest`]s from the configured queue forever, running
    /// each through `submit` and `ack`ing on completion (including a
    /// terminal `failed`/`cancelled` run, since the queue's contract is
    /// "this message was processed," not "this run succeeded").
    ///
    /// Runs dispatched this way execute concurrently up to the workflow
    /// concurrency cap; `submit`'s semaphore acquisition provides the
    /// backpressure, so this loop re-enters `consume` eagerly rather than
    /// tracking in-flight count itself. Each `consume` call blocks up to
    /// `BLOCK_TIMEOUT_S`, woken early by cancellation on the next
    /// iteration's check rather than mid-block.
    pub async fn serve(&self) -> Result<(), MicroflowError> {
        const BLOCK_TIMEOUT_S: f64 = 1.0;

        let queue = self
            .queue
            .clone()
            .ok_or_else(|| MicroflowError::ConfigError("no queue configured".to_string()))?;

        info!("workflow runner serve loop started");

        loop {
            if *self.cancel_rx.borrow() {
                info!("cancellation requested; stopping serve loop");
                return Ok(());
            }

            if let Some(message) = queue.consume(BLOCK_TIMEOUT_S).await? {
                self.handle_message(queue.as_ref(), message).await;
            }
        }
    }

    async fn handle_message(&self, queue: &dyn Queue, message: Message) {
        let request: RunRequest = match serde_json::from_value(message.body.clone()) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "dropping malformed run request");
                let _ = queue.ack(message.id).await;
                return;
            }
        };

        debug!(run_id = %request.run_id, "dispatching run from queue");

        match self.submit(request.run_id.clone(), request.initial_ctx).await {
            Ok(result) => {
                debug!(run_id = %request.run_id, succeeded = result.succeeded(), "run finished");
            }
            Err(e) => {
                warn!(run_id = %request.run_id, error = %e, "run failed to execute");
            }
        }

        let _ = queue.ack(message.id).await;
    }
}
