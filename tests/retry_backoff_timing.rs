// tests/retry_backoff_timing.rs

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use microflow::{task, Context, Event, EventSink, Scheduler, Workflow};
use microflow_test_utils::fakes::FakeStateStore;
use tokio::sync::watch;

#[derive(Default)]
struct CollectingSink {
    started_ats: Mutex<Vec<DateTime<Utc>>>,
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        if let Event::TaskStarted { at, .. } = event {
            self.started_ats.lock().unwrap().push(at);
        }
    }
}

/// A task with `max_retries=2, backoff_s=0.1` that always fails records
/// attempt starts spaced at roughly `backoff_s`, `2*backoff_s` apart
/// (exponential backoff), not immediately back-to-back.
#[tokio::test]
async fn backoff_delays_successive_attempts() {
    microflow_test_utils::init_tracing();

    let r = task("r", |_ctx: Context| async { Err(anyhow::anyhow!("always fails")) })
        .with_max_retries(2)
        .with_backoff_s(0.1);

    let workflow = Arc::new(Workflow::try_new(vec![r]).unwrap());
    let store = Arc::new(FakeStateStore::new());
    let sink = Arc::new(CollectingSink::default());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(store).with_events(sink.clone());
    let result = microflow_test_utils::with_timeout(scheduler.run(
        workflow,
        "run-backoff".to_string(),
        Context::new(),
        cancel_rx,
    ))
    .await
    .unwrap();

    assert!(!result.succeeded());
    assert_eq!(result.run.task("r").unwrap().attempts, 3);

    let starts = sink.started_ats.lock().unwrap();
    assert_eq!(starts.len(), 3);

    let gap_1 = (starts[1] - starts[0]).num_milliseconds();
    let gap_2 = (starts[2] - starts[1]).num_milliseconds();

    // backoff_s=0.1 doubles per attempt: ~100ms, then ~200ms. Generous
    // tolerance accounts for scheduler jitter under test-harness load.
    assert!(gap_1 >= 80, "first retry fired too early: {gap_1}ms");
    assert!(gap_2 >= 160, "second retry fired too early: {gap_2}ms");
}
