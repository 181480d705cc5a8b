// tests/retry_then_succeed.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use microflow::{task, Context, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use serde_json::json;
use tokio::sync::watch;

#[tokio::test]
async fn task_retries_then_succeeds() {
    microflow_test_utils::init_tracing();

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in_fn = attempts.clone();

    let r = task("r", move |_ctx: Context| {
        let attempts = attempts_in_fn.clone();
        async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                Err(anyhow::anyhow!("not yet"))
            } else {
                Ok(Some(json!({"ok": true})))
            }
        }
    })
    .with_max_retries(2)
    .with_backoff_s(0.05);

    let workflow = Arc::new(Workflow::try_new(vec![r]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(store.clone());
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-retry".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.run.ctx.get("ok"), Some(&json!(true)));
    assert_eq!(result.run.task("r").unwrap().attempts, 3);
}
