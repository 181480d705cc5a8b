// tests/fatal_mid_dag.rs

use std::sync::Arc;

use microflow::record::{RunStatus, TaskStatus};
use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

#[tokio::test]
async fn fatal_task_skips_downstream_and_fails_the_run() {
    microflow_test_utils::init_tracing();

    let a = task("a", |_ctx: Context| async { Ok(Some(json!({}))) });
    let b = task("b", |_ctx: Context| async { Err(anyhow::anyhow!("boom")) }).depends_on("a");
    let c = task("c", |_ctx: Context| async { Ok(Some(json!({}))) }).depends_on("b");

    let workflow = Arc::new(Workflow::try_new(vec![a, b, c]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(store);
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-fatal".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert_eq!(result.run.status, RunStatus::Failed);
    assert_eq!(result.run.task("a").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.run.task("b").unwrap().status, TaskStatus::Failed);
    assert_eq!(result.run.task("c").unwrap().status, TaskStatus::Skipped);
}
