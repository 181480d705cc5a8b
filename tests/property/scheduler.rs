use std::collections::HashMap;

use proptest::prelude::*;

use microflow::record::TaskStatus;
use microflow::scheduler::core::SchedulerCore;
use microflow::{task, Context, TaskSpec, Workflow};
use serde_json::json;

fn noop(_ctx: Context) -> impl std::future::Future<Output = anyhow::Result<Option<serde_json::Value>>> {
    async { Ok(Some(json!({}))) }
}

/// Generate a random acyclic DAG: task `i` may only depend on tasks `< i`,
/// which guarantees acyclicity by construction without needing a separate
/// rejection step.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskSpec>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks.max(1)),
            num_tasks,
        );

        deps_strat.prop_map(move |raw_deps| {
            let mut specs = Vec::new();
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let name = format!("task_{i}");
                let mut spec = task(name, noop);

                let mut valid_deps: Vec<usize> = potential_deps
                    .into_iter()
                    .filter(|_| i > 0)
                    .map(|d| d % i.max(1))
                    .collect();
                valid_deps.sort_unstable();
                valid_deps.dedup();

                for dep_idx in valid_deps {
                    spec = spec.depends_on(format!("task_{dep_idx}"));
                }
                specs.push(spec);
            }
            specs
        })
    })
}

proptest! {
    /// Any acyclic DAG, run entirely to success, reaches `all_terminal` in a
    /// bounded number of `collect_ready` waves — the scheduler never stalls
    /// with pending work it could make progress on.
    #[test]
    fn scheduler_terminates_on_any_acyclic_dag(specs in dag_strategy(12)) {
        let task_count = specs.len();
        let workflow = Workflow::try_new(specs).expect("generated DAG is acyclic by construction");

        let statuses: HashMap<String, TaskStatus> = workflow
            .task_names()
            .map(|n| (n.to_string(), TaskStatus::Pending))
            .collect();
        let mut core = SchedulerCore::new(&workflow, statuses);

        let mut waves = 0;
        while !core.all_terminal() {
            let ready = core.collect_ready();
            prop_assert!(
                !ready.is_empty() || core.all_terminal(),
                "scheduler stalled with no ready tasks and the run incomplete"
            );
            for name in ready {
                core.mark_succeeded(&name);
            }
            waves += 1;
            prop_assert!(waves <= task_count + 1, "more waves than tasks; likely a stuck dependency");
        }

        prop_assert!(!core.any_failed());
    }

    /// Failing the very first ready task should skip every transitive
    /// dependent and leave the run terminal, never stuck.
    #[test]
    fn failing_a_root_task_terminates_the_run(specs in dag_strategy(12)) {
        let workflow = Workflow::try_new(specs).expect("generated DAG is acyclic by construction");

        let statuses: HashMap<String, TaskStatus> = workflow
            .task_names()
            .map(|n| (n.to_string(), TaskStatus::Pending))
            .collect();
        let mut core = SchedulerCore::new(&workflow, statuses);

        let first_wave = core.collect_ready();
        prop_assume!(!first_wave.is_empty());
        let failed = &first_wave[0];
        core.mark_failed_terminal(failed);
        for other in &first_wave[1..] {
            core.mark_succeeded(other);
        }

        let mut waves = 0;
        while !core.all_terminal() {
            let ready = core.collect_ready();
            prop_assert!(!ready.is_empty(), "scheduler stalled after a root failure");
            for name in ready {
                core.mark_succeeded(&name);
            }
            waves += 1;
            prop_assert!(waves <= workflow.len() + 1);
        }

        prop_assert!(core.any_failed());
    }
}
