// tests/linear_dag.rs

use std::sync::Arc;

use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

#[tokio::test]
async fn linear_chain_merges_context_in_order() {
    microflow_test_utils::init_tracing();

    let a = task("a", |_ctx: Context| async { Ok(Some(json!({"x": 1}))) });
    let b = task("b", |ctx: Context| async move {
        let x = ctx.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Some(json!({"y": x + 1})))
    })
    .depends_on("a");
    let c = task("c", |ctx: Context| async move {
        let y = ctx.get("y").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Some(json!({"z": y * 10})))
    })
    .depends_on("b");

    let workflow = Arc::new(Workflow::try_new(vec![a, b, c]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(store.clone());
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-linear".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.run.ctx.get("x"), Some(&json!(1)));
    assert_eq!(result.run.ctx.get("y"), Some(&json!(2)));
    assert_eq!(result.run.ctx.get("z"), Some(&json!(20)));
}
