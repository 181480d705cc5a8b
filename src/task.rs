// src/task.rs

//! Task declaration: identity, callable, and retry/backoff/timeout policy.
//!
//! A [`TaskSpec`] is built via the declarative `task(...)` factory, the
//! Rust-idiomatic reading of the "task decorator" pattern: a plain value
//! constructor, not a runtime metaclass or attribute-injecting decorator.
//! Dependency edges are intrinsic to the task declaration (they model the
//! author's intent), not to any one [`crate::workflow::Workflow`] it ends
//! up in, so the same `TaskSpec` can be reused across workflows.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;

/// Canonical task name type, unique within a workflow.
pub type TaskName = String;

/// The value a task's `fn` resolves to: `Ok(Some(delta))` to merge into
/// context, `Ok(None)` to merge nothing, `Err(_)` for a user-raised
/// failure (wrapped as [`crate::error::MicroflowError::TaskUserError`] by
/// the scheduler).
pub type TaskFnOutput = anyhow::Result<Option<Value>>;

type TaskFuture = Pin<Box<dyn Future<Output = TaskFnOutput> + Send>>;

/// A task callable: receives an immutable context snapshot, produces a
/// delta to merge (or nothing).
pub type TaskFn = Arc<dyn Fn(Context) -> TaskFuture + Send + Sync>;

/// Immutable declaration of one task and its policy.
///
/// Builder methods consume and return `self` so construction reads as a
/// chain: `task("fetch", fetch_fn).max_retries(3).timeout_s(30.0)`.
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) name: TaskName,
    pub(crate) fn_: TaskFn,
    pub(crate) max_retries: u32,
    pub(crate) backoff_s: f64,
    pub(crate) timeout_s: Option<f64>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) description: String,
    pub(crate) deps: BTreeSet<TaskName>,
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .field("backoff_s", &self.backoff_s)
            .field("timeout_s", &self.timeout_s)
            .field("tags", &self.tags)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl TaskSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deps(&self) -> &BTreeSet<TaskName> {
        &self.deps
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_s(&self) -> f64 {
        self.backoff_s
    }

    pub fn timeout_s(&self) -> Option<f64> {
        self.timeout_s
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Total attempts available for this task (retries + the first try).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_s(mut self, backoff_s: f64) -> Self {
        self.backoff_s = backoff_s;
        self
    }

    pub fn with_timeout_s(mut self, timeout_s: f64) -> Self {
        self.timeout_s = Some(timeout_s);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add an upstream dependency by name.
    pub fn depends_on(mut self, upstream: impl Into<TaskName>) -> Self {
        self.deps.insert(upstream.into());
        self
    }

    /// Add several upstream dependencies by name.
    pub fn depends_on_all<I, S>(mut self, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.deps.extend(upstreams.into_iter().map(Into::into));
        self
    }
}

/// Declarative factory for a [`TaskSpec`].
///
/// `fn_` is any `Fn(Context) -> impl Future<Output = TaskFnOutput>`; use an
/// `async move` closure for the common case.
pub fn task<F, Fut>(name: impl Into<TaskName>, fn_: F) -> TaskSpec
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskFnOutput> + Send + 'static,
{
    TaskSpec {
        name: name.into(),
        fn_: Arc::new(move |ctx| Box::pin(fn_(ctx))),
        max_retries: 0,
        backoff_s: 1.0,
        timeout_s: None,
        tags: BTreeSet::new(),
        description: String::new(),
        deps: BTreeSet::new(),
    }
}

/// The DAG edge operator: "downstream depends on upstream".
///
/// Adds `upstream.name()` to `downstream`'s dependency set and returns the
/// (cloned) downstream spec, so calls compose: `edge(&a, &edge(&b, &c))`
/// reads back-to-front like the source's `a ▶ b` chain.
pub fn edge(upstream: &TaskSpec, downstream: &TaskSpec) -> TaskSpec {
    downstream.clone().depends_on(upstream.name.clone())
}

impl std::ops::Shr<&TaskSpec> for &TaskSpec {
    type Output = TaskSpec;

    /// `a >> b` reads "a then b": b now depends on a.
    fn shr(self, downstream: &TaskSpec) -> TaskSpec {
        edge(self, downstream)
    }
}

impl std::ops::Shr<&TaskSpec> for TaskSpec {
    type Output = TaskSpec;

    fn shr(self, downstream: &TaskSpec) -> TaskSpec {
        edge(&self, downstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_fn(_ctx: Context) -> impl Future<Output = TaskFnOutput> {
        async { Ok(Some(json!({"ok": true}))) }
    }

    #[test]
    fn shr_operator_adds_dependency_and_returns_downstream() {
        let a = task("a", noop_fn);
        let b = task("b", noop_fn);

        let b = &a >> &b;

        assert_eq!(b.name(), "b");
        assert!(b.deps().contains("a"));
    }

    #[test]
    fn edge_is_equivalent_to_shr() {
        let a = task("a", noop_fn);
        let b = task("b", noop_fn);

        let via_edge = edge(&a, &b);
        let via_operator = &a >> &b;

        assert_eq!(via_edge.deps(), via_operator.deps());
    }

    #[test]
    fn builder_methods_compose() {
        let t = task("x", noop_fn)
            .with_max_retries(3)
            .with_backoff_s(2.0)
            .with_timeout_s(10.0)
            .with_tag("io")
            .with_description("does x");

        assert_eq!(t.max_attempts(), 4);
        assert_eq!(t.backoff_s(), 2.0);
        assert_eq!(t.timeout_s(), Some(10.0));
        assert!(t.tags().contains("io"));
        assert_eq!(t.description(), "does x");
    }
}
