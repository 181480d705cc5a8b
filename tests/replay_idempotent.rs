// tests/replay_idempotent.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

/// Re-running an already-terminal run_id must not re-invoke any task `fn`:
/// `Scheduler::run` returns the stored result immediately.
#[tokio::test]
async fn rerunning_a_terminal_run_id_is_a_no_op() {
    microflow_test_utils::init_tracing();

    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_in_fn = invocations.clone();

    let a = task("a", move |_ctx: Context| {
        let invocations = invocations_in_fn.clone();
        async move {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok(Some(json!({"n": 1})))
        }
    });

    let workflow = Arc::new(Workflow::try_new(vec![a]).unwrap());
    let store = Arc::new(FakeStateStore::new());

    let scheduler = Scheduler::new(store.clone());

    let (_cancel_tx1, cancel_rx1) = watch::channel(false);
    let first = microflow_test_utils::with_timeout(scheduler.run(
        workflow.clone(),
        "run-replay".to_string(),
        Context::new(),
        cancel_rx1,
    ))
    .await
    .unwrap();
    assert!(first.succeeded());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let (_cancel_tx2, cancel_rx2) = watch::channel(false);
    let second = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-replay".to_string(),
        Context::new(),
        cancel_rx2,
    ))
    .await
    .unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1, "task fn was re-invoked on replay");
    assert_eq!(second.run.status, first.run.status);
    assert_eq!(second.run.ctx.get("n"), first.run.ctx.get("n"));
}
