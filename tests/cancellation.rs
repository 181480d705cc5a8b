// tests/cancellation.rs

use std::sync::Arc;
use std::time::Duration;

use microflow::record::{RunStatus, TaskStatus};
use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

#[tokio::test]
async fn cancelling_mid_flight_skips_downstream() {
    microflow_test_utils::init_tracing();

    let a = task("a", |_ctx: Context| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Some(json!({})))
    });
    let b = task("b", |_ctx: Context| async { Ok(Some(json!({}))) }).depends_on("a");

    let workflow = Arc::new(Workflow::try_new(vec![a, b]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = cancel_tx.send(true);
    });

    let scheduler = Scheduler::new(store.clone());
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-cancel".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert_eq!(result.run.status, RunStatus::Cancelled);
    assert_eq!(result.run.task("a").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(result.run.task("b").unwrap().status, TaskStatus::Skipped);
}
