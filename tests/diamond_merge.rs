// tests/diamond_merge.rs

use std::sync::Arc;

use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

#[tokio::test]
async fn diamond_dag_merges_both_branches() {
    microflow_test_utils::init_tracing();

    let a = task("a", |_ctx: Context| async { Ok(Some(json!({"v": 10}))) });
    let b = task("b", |ctx: Context| async move {
        let v = ctx.get("v").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Some(json!({"b": v * 2})))
    })
    .depends_on("a");
    let c = task("c", |ctx: Context| async move {
        let v = ctx.get("v").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Some(json!({"c": v + 5})))
    })
    .depends_on("a");
    let d = task("d", |ctx: Context| async move {
        let b = ctx.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
        let c = ctx.get("c").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Some(json!({"sum": b + c})))
    })
    .depends_on_all(["b", "c"]);

    let workflow = Arc::new(Workflow::try_new(vec![a, b, c, d]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(store);
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-diamond".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.run.ctx.get("sum"), Some(&json!(35)));
}
