// src/scheduler/mod.rs

//! Async driver that turns a [`Workflow`] and a [`crate::store::StateStore`]
//! into a running workflow execution.
//!
//! Structurally this plays the role of an `engine/runtime.rs`-style shell:
//! an async IO loop wrapped around the pure [`core::SchedulerCore`] state
//! machine, spawning one `tokio` task per task attempt
//! (`exec/executor_loop.rs`'s "one tokio task per scheduled unit of work")
//! and funnelling completions back through an `mpsc` channel rather than
//! mutating shared state from multiple tasks directly.

pub mod core;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Semaphore};

use crate::context::Context;
use crate::error::MicroflowError;
use crate::events::{Event, EventSink, NullSink};
use crate::record::{Run, RunResult, RunStatus, TaskRecord, TaskStatus};
use crate::retry::backoff_delay_s;
use crate::store::StateStore;
use crate::task::{TaskName, TaskSpec};
use crate::workflow::Workflow;

use self::core::SchedulerCore;

const STORE_RETRY_DELAYS_MS: [u64; 3] = [50, 200, 800];

enum Completion {
    Succeeded(TaskName),
    Failed(TaskName),
    Cancelled(TaskName),
}

/// Drives one workflow run to completion against a state store.
pub struct Scheduler {
    store: Arc<dyn StateStore>,
    events: Arc<dyn EventSink>,
    task_semaphore: Option<Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            events: Arc::new(NullSink),
            task_semaphore: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Cap how many task attempts run concurrently across this run.
    /// `None` (the default) leaves execution unbounded except by the
    /// DAG's own parallelism. Builds a semaphore private to this
    /// `Scheduler`; for a cap shared across concurrently executing runs,
    /// use [`Scheduler::with_task_semaphore`] instead.
    pub fn with_task_concurrency(mut self, max: usize) -> Self {
        self.task_semaphore = Some(Arc::new(Semaphore::new(max)));
        self
    }

    /// Cap task attempts against a semaphore shared with other `Scheduler`
    /// instances, so the limit holds process-wide across concurrent runs
    /// rather than per-run.
    pub fn with_task_semaphore(mut self, semaphore: Arc<Semaphore>) -> Self {
        self.task_semaphore = Some(semaphore);
        self
    }

    /// Execute `workflow` under `run_id`. If a run already exists for
    /// `run_id` and has reached a terminal status, this is a no-op that
    /// returns the stored result unchanged (Open Question 1: replay
    /// semantics).
    pub async fn run(
        &self,
        workflow: Arc<Workflow>,
        run_id: String,
        initial_ctx: Context,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunResult, MicroflowError> {
        let mut run = match with_store_retry(|| self.store.load_run(&run_id)).await? {
            Some(existing) if existing.is_terminal() => {
                return Ok(RunResult { run: existing });
            }
            Some(existing) => existing,
            None => {
                let run = Run::new(
                    run_id.clone(),
                    workflow_name(&workflow),
                    workflow.task_names().map(str::to_string).collect(),
                    initial_ctx,
                );
                with_store_retry(|| self.store.save_run(&run)).await?;
                run
            }
        };

        run.status = RunStatus::Running;
        with_store_retry(|| self.store.save_run(&run)).await?;
        self.events.emit(Event::RunStarted {
            run_id: run_id.clone(),
            at: chrono::Utc::now(),
        });

        let statuses: HashMap<TaskName, TaskStatus> = run
            .tasks
            .iter()
            .map(|t| (t.name.clone(), t.status))
            .collect();
        let mut sched = SchedulerCore::new(&workflow, statuses);

        let (tx, mut rx) = mpsc::channel::<Completion>(workflow.len().max(1));
        let mut in_flight: usize = 0;

        let mut cancelled = *cancel.borrow();

        loop {
            if !cancelled {
                for name in sched.collect_ready() {
                    in_flight += 1;
                    self.spawn_task_driver(
                        workflow.clone(),
                        run_id.clone(),
                        name,
                        tx.clone(),
                        cancel.clone(),
                    );
                }
            }

            if sched.all_terminal() {
                break;
            }

            if in_flight == 0 {
                // Nothing running and nothing newly ready: either cancelled
                // with only pending work left, or the run is stuck. Mark any
                // still-pending task cancelled so the run can terminate.
                let pending: Vec<TaskName> = workflow
                    .task_names()
                    .filter(|n| sched.status_of(n) == Some(TaskStatus::Pending))
                    .map(str::to_string)
                    .collect();
                if pending.is_empty() {
                    break;
                }
                for name in pending {
                    if sched.status_of(&name) != Some(TaskStatus::Pending) {
                        // Already cascaded to Skipped by an earlier iteration.
                        continue;
                    }
                    let skipped = sched.mark_cancelled(&name);
                    let err = MicroflowError::TaskCancelledError { task: name.clone() };
                    self.persist_task(&run_id, TaskRecord {
                        name: name.clone(),
                        status: TaskStatus::Cancelled,
                        attempts: 0,
                        error: Some(err.as_task_error()),
                        started_at: None,
                        finished_at: Some(chrono::Utc::now()),
                    })
                    .await?;
                    for dep in skipped {
                        self.events.emit(Event::TaskSkipped {
                            run_id: run_id.clone(),
                            task: dep.clone(),
                            upstream: name.clone(),
                        });
                        self.persist_task(&run_id, TaskRecord {
                            name: dep,
                            status: TaskStatus::Skipped,
                            attempts: 0,
                            error: None,
                            started_at: None,
                            finished_at: Some(chrono::Utc::now()),
                        })
                        .await?;
                    }
                }
                continue;
            }

            tokio::select! {
                completion = rx.recv() => {
                    in_flight -= 1;
                    match completion {
                        Some(Completion::Succeeded(name)) => {
                            sched.mark_succeeded(&name);
                        }
                        Some(Completion::Failed(name)) => {
                            let skipped = sched.mark_failed_terminal(&name);
                            for dep in skipped {
                                self.events.emit(Event::TaskSkipped {
                                    run_id: run_id.clone(),
                                    task: dep.clone(),
                                    upstream: name.clone(),
                                });
                                self.persist_task(&run_id, TaskRecord {
                                    name: dep,
                                    status: TaskStatus::Skipped,
                                    attempts: 0,
                                    error: None,
                                    started_at: None,
                                    finished_at: Some(chrono::Utc::now()),
                                }).await?;
                            }
                        }
                        Some(Completion::Cancelled(name)) => {
                            let skipped = sched.mark_cancelled(&name);
                            for dep in skipped {
                                self.events.emit(Event::TaskSkipped {
                                    run_id: run_id.clone(),
                                    task: dep.clone(),
                                    upstream: name.clone(),
                                });
                                self.persist_task(&run_id, TaskRecord {
                                    name: dep,
                                    status: TaskStatus::Skipped,
                                    attempts: 0,
                                    error: None,
                                    started_at: None,
                                    finished_at: Some(chrono::Utc::now()),
                                }).await?;
                            }
                        }
                        None => break,
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_ok() && *cancel.borrow() {
                        cancelled = true;
                    }
                }
            }
        }

        let final_status = if sched.any_failed() {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let mut run = with_store_retry(|| self.store.load_run(&run_id))
            .await?
            .ok_or_else(|| MicroflowError::StoreError(format!("run '{run_id}' vanished")))?;
        run.status = final_status;
        run.updated_at = chrono::Utc::now();
        with_store_retry(|| self.store.save_run(&run)).await?;

        self.events.emit(Event::RunFinished {
            run_id: run_id.clone(),
            status: final_status,
            at: chrono::Utc::now(),
        });

        Ok(RunResult { run })
    }

    async fn persist_task(&self, run_id: &str, task: TaskRecord) -> Result<(), MicroflowError> {
        with_store_retry(|| self.store.upsert_task(run_id, task.clone())).await
    }

    fn spawn_task_driver(
        &self,
        workflow: Arc<Workflow>,
        run_id: String,
        name: TaskName,
        tx: mpsc::Sender<Completion>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let store = self.store.clone();
        let events = self.events.clone();
        let semaphore = self.task_semaphore.clone();

        tokio::spawn(async move {
            let spec = workflow
                .task(&name)
                .expect("ready task name always resolves in its own workflow")
                .clone();

            let outcome = drive_task(
                spec,
                run_id.clone(),
                store.as_ref(),
                events.as_ref(),
                semaphore.as_deref(),
                &mut cancel,
            )
            .await;

            let completion = match outcome {
                TaskOutcome::Succeeded => Completion::Succeeded(name),
                TaskOutcome::Failed => Completion::Failed(name),
                TaskOutcome::Cancelled => Completion::Cancelled(name),
            };
            let _ = tx.send(completion).await;
        });
    }
}

enum TaskOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Execute one task's attempts until it succeeds, exhausts retries, or is
/// cancelled. Backoff sleeps happen without holding a semaphore permit, so
/// a task waiting out its backoff never blocks another task's attempt.
async fn drive_task(
    spec: TaskSpec,
    run_id: String,
    store: &dyn StateStore,
    events: &dyn EventSink,
    semaphore: Option<&Semaphore>,
    cancel: &mut watch::Receiver<bool>,
) -> TaskOutcome {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if *cancel.borrow() {
            let err = MicroflowError::TaskCancelledError {
                task: spec.name().to_string(),
            };
            let _ = with_store_retry(|| {
                store.upsert_task(
                    &run_id,
                    TaskRecord {
                        name: spec.name().to_string(),
                        status: TaskStatus::Cancelled,
                        attempts: attempt - 1,
                        error: Some(err.as_task_error()),
                        started_at: None,
                        finished_at: Some(chrono::Utc::now()),
                    },
                )
            })
            .await;
            events.emit(Event::TaskCancelled {
                run_id,
                task: spec.name().to_string(),
            });
            return TaskOutcome::Cancelled;
        }

        let _permit = match semaphore {
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };

        let started_at = chrono::Utc::now();
        let _ = with_store_retry(|| {
            store.upsert_task(
                &run_id,
                TaskRecord {
                    name: spec.name().to_string(),
                    status: TaskStatus::Running,
                    attempts: attempt,
                    error: None,
                    started_at: Some(started_at),
                    finished_at: None,
                },
            )
        })
        .await;
        events.emit(Event::TaskStarted {
            run_id: run_id.clone(),
            task: spec.name().to_string(),
            attempt,
            at: started_at,
        });

        let ctx_snapshot = match with_store_retry(|| store.load_run(&run_id)).await {
            Ok(Some(run)) => run.ctx,
            _ => Context::new(),
        };

        let attempt_result = run_one_attempt(&spec, attempt, ctx_snapshot, cancel).await;
        drop(_permit);

        match attempt_result {
            AttemptResult::Cancelled => {
                let err = MicroflowError::TaskCancelledError {
                    task: spec.name().to_string(),
                };
                let _ = with_store_retry(|| {
                    store.upsert_task(
                        &run_id,
                        TaskRecord {
                            name: spec.name().to_string(),
                            status: TaskStatus::Cancelled,
                            attempts: attempt,
                            error: Some(err.as_task_error()),
                            started_at: Some(started_at),
                            finished_at: Some(chrono::Utc::now()),
                        },
                    )
                })
                .await;
                events.emit(Event::TaskCancelled {
                    run_id,
                    task: spec.name().to_string(),
                });
                return TaskOutcome::Cancelled;
            }
            AttemptResult::Success(delta) => {
                if let Some(delta) = delta {
                    match Context::from_task_output(&spec.name().to_string(), delta) {
                        Ok(ctx_delta) => {
                            let _ = with_store_retry(|| store.update_ctx(&run_id, ctx_delta.clone())).await;
                        }
                        Err(_) => {
                            // Non-object output is a `SerializationError`: not
                            // retried, the task is marked failed immediately.
                            let err = MicroflowError::SerializationError {
                                task: spec.name().to_string(),
                                message: "task output was not a JSON object".to_string(),
                            };
                            let finished_at = chrono::Utc::now();
                            let _ = with_store_retry(|| {
                                store.upsert_task(
                                    &run_id,
                                    TaskRecord {
                                        name: spec.name().to_string(),
                                        status: TaskStatus::Failed,
                                        attempts: attempt,
                                        error: Some(err.as_task_error()),
                                        started_at: Some(started_at),
                                        finished_at: Some(finished_at),
                                    },
                                )
                            })
                            .await;
                            events.emit(Event::TaskFailed {
                                run_id,
                                task: spec.name().to_string(),
                                attempt,
                                reason: err.to_string(),
                            });
                            return TaskOutcome::Failed;
                        }
                    }
                }

                let finished_at = chrono::Utc::now();
                let _ = with_store_retry(|| {
                    store.upsert_task(
                        &run_id,
                        TaskRecord {
                            name: spec.name().to_string(),
                            status: TaskStatus::Succeeded,
                            attempts: attempt,
                            error: None,
                            started_at: Some(started_at),
                            finished_at: Some(finished_at),
                        },
                    )
                })
                .await;
                events.emit(Event::TaskSucceeded {
                    run_id,
                    task: spec.name().to_string(),
                    attempt,
                    at: finished_at,
                });
                return TaskOutcome::Succeeded;
            }
            AttemptResult::Failure(err) => {
                if let Some(outcome) =
                    handle_failure(&spec, &run_id, attempt, started_at, err, store, events).await
                {
                    return outcome;
                }
            }
        }
    }
}

enum AttemptResult {
    Success(Option<serde_json::Value>),
    Failure(MicroflowError),
    Cancelled,
}

async fn run_one_attempt(
    spec: &TaskSpec,
    attempt: u32,
    ctx: Context,
    cancel: &mut watch::Receiver<bool>,
) -> AttemptResult {
    let fn_ = spec.fn_.clone();
    let work = (fn_)(ctx);

    let raced = async {
        tokio::select! {
            result = work => Either::Work(result),
            _ = cancel.changed() => Either::Cancelled,
        }
    };

    let outcome = match spec.timeout_s() {
        Some(timeout_s) => match tokio::time::timeout(Duration::from_secs_f64(timeout_s), raced).await {
            Ok(either) => either,
            Err(_) => {
                return AttemptResult::Failure(MicroflowError::TaskTimeoutError {
                    task: spec.name().to_string(),
                    attempt,
                    timeout_s,
                })
            }
        },
        None => raced.await,
    };

    match outcome {
        Either::Work(Ok(delta)) => AttemptResult::Success(delta),
        Either::Work(Err(e)) => AttemptResult::Failure(MicroflowError::TaskUserError {
            task: spec.name().to_string(),
            attempt,
            message: e.to_string(),
        }),
        Either::Cancelled => AttemptResult::Cancelled,
    }
}

enum Either<T> {
    Work(T),
    Cancelled,
}

/// Shared tail of the retry decision: persist the failure, retry after
/// backoff if attempts remain, or return the terminal outcome.
async fn handle_failure(
    spec: &TaskSpec,
    run_id: &str,
    attempt: u32,
    started_at: DateTime<Utc>,
    err: MicroflowError,
    store: &dyn StateStore,
    events: &dyn EventSink,
) -> Option<TaskOutcome> {
    let message = err.to_string();
    if attempt < spec.max_attempts() {
        let backoff = backoff_delay_s(spec.backoff_s(), attempt);
        events.emit(Event::TaskRetrying {
            run_id: run_id.to_string(),
            task: spec.name().to_string(),
            attempt,
            backoff_s: backoff,
            reason: message,
        });
        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
        None
    } else {
        let _ = with_store_retry(|| {
            store.upsert_task(
                run_id,
                TaskRecord {
                    name: spec.name().to_string(),
                    status: TaskStatus::Failed,
                    attempts: attempt,
                    error: Some(err.as_task_error()),
                    started_at: Some(started_at),
                    finished_at: Some(chrono::Utc::now()),
                },
            )
        })
        .await;
        events.emit(Event::TaskFailed {
            run_id: run_id.to_string(),
            task: spec.name().to_string(),
            attempt,
            reason: message,
        });
        Some(TaskOutcome::Failed)
    }
}

fn workflow_name(workflow: &Workflow) -> String {
    // Workflows are anonymous collections of tasks; callers that care about
    // a display name attach it at the `WorkflowRunner` layer. Here we
    // derive a stable placeholder from the task set so two runs of the
    // same shape land on the same label.
    format!("workflow[{}]", workflow.len())
}

/// Retry a store operation with fixed backoff before surfacing the error to
/// the caller. A flaky store should not fail a run outright on a single
/// transient hiccup.
async fn with_store_retry<F, Fut, T>(mut op: F) -> Result<T, MicroflowError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, MicroflowError>>,
{
    let mut last_err = None;
    for delay_ms in STORE_RETRY_DELAYS_MS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(MicroflowError::StoreError(msg)) => {
                last_err = Some(MicroflowError::StoreError(msg));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(other) => return Err(other),
        }
    }
    op().await.map_err(|_| {
        last_err.unwrap_or_else(|| MicroflowError::StoreError("store unavailable".to_string()))
    })
}
