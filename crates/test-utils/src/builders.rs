#![allow(dead_code)]

use std::future::Future;

use microflow::{task, TaskSpec, Workflow};
use serde_json::{json, Value};

/// Builds a no-op [`TaskSpec`] (always succeeds with an empty delta) by
/// name, for tests that only care about DAG shape, not task bodies.
pub fn noop_task(name: &str) -> TaskSpec {
    task(name.to_string(), |_ctx| async { Ok(Some(json!({}))) })
}

/// Builds a [`TaskSpec`] whose body always fails with the given message.
pub fn failing_task(name: &str, message: &str) -> TaskSpec {
    let message = message.to_string();
    task(name.to_string(), move |_ctx| {
        let message = message.clone();
        async move { Err(anyhow::anyhow!(message)) }
    })
}

/// Builds a [`TaskSpec`] whose body returns the given JSON value as its
/// context delta.
pub fn value_task(name: &str, value: Value) -> TaskSpec {
    task(name.to_string(), move |_ctx| {
        let value = value.clone();
        async move { Ok(Some(value)) }
    })
}

/// Collects [`TaskSpec`]s into a [`Workflow`], panicking on invalid DAGs —
/// convenient in tests where an invalid fixture is itself a test failure.
pub struct WorkflowBuilder {
    specs: Vec<TaskSpec>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn task_fn<F, Fut>(self, name: &str, fn_: F) -> Self
    where
        F: Fn(microflow::Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.task(task(name.to_string(), fn_))
    }

    pub fn build(self) -> Workflow {
        Workflow::try_new(self.specs).expect("test fixture workflow must be valid")
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
