// src/scheduler/core.rs

//! Pure, synchronous scheduling state machine.
//!
//! `SchedulerCore` holds no IO, no clock, and no task `fn`s — it only
//! tracks each task's [`TaskStatus`] against the workflow's dependency
//! graph and decides what becomes ready next. This mirrors a
//! `Scheduler`/`StateManager` separation (pure DAG bookkeeping) from
//! `engine/runtime.rs` (the async IO loop that drives it): the pure core is
//! exhaustively unit- and property-testable without a `tokio` runtime,
//! while [`super::Scheduler`] supplies the IO.

use std::collections::HashMap;

use crate::record::TaskStatus;
use crate::task::TaskName;
use crate::workflow::Workflow;

#[derive(Debug)]
pub struct SchedulerCore<'a> {
    workflow: &'a Workflow,
    statuses: HashMap<TaskName, TaskStatus>,
}

impl<'a> SchedulerCore<'a> {
    /// Build a core from a workflow and the current status of each task
    /// (as loaded from a [`crate::record::Run`], so a replayed run resumes
    /// from exactly where it left off rather than restarting pending work).
    pub fn new(workflow: &'a Workflow, statuses: HashMap<TaskName, TaskStatus>) -> Self {
        Self { workflow, statuses }
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.statuses.get(name).copied()
    }

    /// Tasks that are `Pending` and whose every dependency has `Succeeded`.
    /// Marks each as `Running` before returning it, so a second call never
    /// returns the same task twice.
    pub fn collect_ready(&mut self) -> Vec<TaskName> {
        let candidates: Vec<TaskName> = self
            .workflow
            .task_names()
            .filter(|name| {
                self.statuses.get(*name) == Some(&TaskStatus::Pending)
                    && self.deps_satisfied(name)
            })
            .map(str::to_string)
            .collect();

        for name in &candidates {
            self.statuses.insert(name.clone(), TaskStatus::Running);
        }

        candidates
    }

    fn deps_satisfied(&self, name: &str) -> bool {
        self.workflow
            .dependencies_of(name)
            .iter()
            .all(|dep| self.statuses.get(dep) == Some(&TaskStatus::Succeeded))
    }

    pub fn mark_succeeded(&mut self, name: &str) {
        self.statuses.insert(name.to_string(), TaskStatus::Succeeded);
    }

    /// Mark a task cancelled and cascade `Skipped` to every transitive
    /// dependent that hasn't already reached a terminal status. Returns the
    /// names newly marked `Skipped`.
    pub fn mark_cancelled(&mut self, name: &str) -> Vec<TaskName> {
        self.statuses.insert(name.to_string(), TaskStatus::Cancelled);
        self.cascade_skip(name)
    }

    /// Mark a task permanently failed (retries exhausted) and cascade
    /// `Skipped` to every transitive dependent that hasn't already reached
    /// a terminal status. Returns the names newly marked `Skipped`.
    pub fn mark_failed_terminal(&mut self, name: &str) -> Vec<TaskName> {
        self.statuses.insert(name.to_string(), TaskStatus::Failed);
        self.cascade_skip(name)
    }

    fn cascade_skip(&mut self, name: &str) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for dependent in self.workflow.transitive_dependents_of(name) {
            let current = self.statuses.get(&dependent).copied();
            if matches!(current, Some(TaskStatus::Pending) | Some(TaskStatus::Running)) {
                self.statuses.insert(dependent.clone(), TaskStatus::Skipped);
                skipped.push(dependent);
            }
        }
        skipped
    }

    /// Every task in the workflow has reached a status other than
    /// `Pending`/`Running` — the run is done.
    pub fn all_terminal(&self) -> bool {
        self.workflow
            .task_names()
            .all(|name| {
                !matches!(
                    self.statuses.get(name),
                    Some(TaskStatus::Pending) | Some(TaskStatus::Running) | None
                )
            })
    }

    /// Any task reached `Failed` — the run as a whole should be reported
    /// `Failed` rather than `Completed`.
    pub fn any_failed(&self) -> bool {
        self.statuses.values().any(|s| *s == TaskStatus::Failed)
    }

    pub fn statuses(&self) -> &HashMap<TaskName, TaskStatus> {
        &self.statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::task::task;
    use serde_json::json;

    fn noop(_ctx: Context) -> impl std::future::Future<Output = crate::task::TaskFnOutput> {
        async { Ok(Some(json!({}))) }
    }

    fn pending_statuses(wf: &Workflow) -> HashMap<TaskName, TaskStatus> {
        wf.task_names()
            .map(|n| (n.to_string(), TaskStatus::Pending))
            .collect()
    }

    #[test]
    fn diamond_dag_collects_ready_in_waves() {
        let a = task("a", noop);
        let b = task("b", noop).depends_on("a");
        let c = task("c", noop).depends_on("a");
        let d = task("d", noop).depends_on_all(["b", "c"]);
        let wf = Workflow::try_new(vec![a, b, c, d]).unwrap();

        let mut core = SchedulerCore::new(&wf, pending_statuses(&wf));

        assert_eq!(core.collect_ready(), vec!["a".to_string()]);
        assert!(core.collect_ready().is_empty());

        core.mark_succeeded("a");
        let mut wave2 = core.collect_ready();
        wave2.sort();
        assert_eq!(wave2, vec!["b".to_string(), "c".to_string()]);

        assert!(!core.all_terminal());
        core.mark_succeeded("b");
        core.mark_succeeded("c");
        assert_eq!(core.collect_ready(), vec!["d".to_string()]);
        core.mark_succeeded("d");
        assert!(core.all_terminal());
        assert!(!core.any_failed());
    }

    #[test]
    fn failure_skips_transitive_dependents_only() {
        let a = task("a", noop);
        let b = task("b", noop).depends_on("a");
        let c = task("c", noop).depends_on("b");
        let independent = task("z", noop);
        let wf = Workflow::try_new(vec![a, b, c, independent]).unwrap();

        let mut core = SchedulerCore::new(&wf, pending_statuses(&wf));
        core.collect_ready();
        core.mark_failed_terminal("a");

        assert_eq!(core.status_of("b"), Some(TaskStatus::Skipped));
        assert_eq!(core.status_of("c"), Some(TaskStatus::Skipped));
        assert_eq!(core.status_of("z"), Some(TaskStatus::Pending));
        assert!(core.any_failed());
    }
}
