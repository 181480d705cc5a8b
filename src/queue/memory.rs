// src/queue/memory.rs

//! In-process [`Queue`]: a `VecDeque` of ready messages plus a pending map
//! tracking in-flight messages and when their visibility timeout expires.
//!
//! Structurally this generalizes a batch-trigger queue from "batches of
//! trigger names" to "FIFO of opaque messages with per-message ack state,"
//! with the in-flight/visibility bookkeeping shape of a priority task
//! queue (`in_flight: HashMap<Id, T>` plus explicit `ack`/requeue-on-timeout).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::MicroflowError;

use super::{Message, MessageId, Queue};

pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a blocking `consume` rechecks the ready queue while waiting
/// out its `block_timeout_s`. There's no in-process notification to wake
/// on publish, so this is a plain poll.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Inner {
    ready: VecDeque<Message>,
    in_flight: HashMap<MessageId, (Message, Instant)>,
}

pub struct MemoryQueue {
    inner: Mutex<Inner>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
            }),
            visibility_timeout,
        }
    }

    /// Move any in-flight message whose visibility timeout has elapsed back
    /// onto the ready queue. Called opportunistically from `consume` so no
    /// background task is needed for the in-process case.
    fn reap_expired(inner: &mut Inner, _visibility_timeout: Duration) {
        let now = Instant::now();
        let expired: Vec<MessageId> = inner
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| now >= *deadline)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some((message, _)) = inner.in_flight.remove(&id) {
                inner.ready.push_back(message);
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, message: Message) -> Result<(), MicroflowError> {
        let mut inner = self.inner.lock().await;
        inner.ready.push_back(message);
        Ok(())
    }

    async fn consume(&self, block_timeout_s: f64) -> Result<Option<Message>, MicroflowError> {
        let deadline = Instant::now() + Duration::from_secs_f64(block_timeout_s.max(0.0));

        loop {
            let mut inner = self.inner.lock().await;
            Self::reap_expired(&mut inner, self.visibility_timeout);

            if let Some(message) = inner.ready.pop_front() {
                let in_flight_deadline = Instant::now() + self.visibility_timeout;
                inner
                    .in_flight
                    .insert(message.id, (message.clone(), in_flight_deadline));
                return Ok(Some(message));
            }
            drop(inner);

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }

    async fn ack(&self, id: MessageId) -> Result<(), MicroflowError> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_then_consume_returns_fifo_order() {
        let q = MemoryQueue::new();
        q.publish(Message::new(json!({"n": 1}))).await.unwrap();
        q.publish(Message::new(json!({"n": 2}))).await.unwrap();

        let first = q.consume(0.0).await.unwrap().unwrap();
        assert_eq!(first.body, json!({"n": 1}));
    }

    #[tokio::test]
    async fn acked_message_is_not_redelivered() {
        let q = MemoryQueue::new();
        q.publish(Message::new(json!({"n": 1}))).await.unwrap();

        let msg = q.consume(0.0).await.unwrap().unwrap();
        q.ack(msg.id).await.unwrap();

        assert!(q.consume(0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_visibility_timeout() {
        let q = MemoryQueue::with_visibility_timeout(Duration::from_millis(10));
        q.publish(Message::new(json!({"n": 1}))).await.unwrap();

        let first = q.consume(0.0).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        let redelivered = q.consume(0.0).await.unwrap().unwrap();
        assert_eq!(redelivered.id, first.id);
    }

    #[tokio::test]
    async fn consume_blocks_until_timeout_elapses_with_no_message() {
        let q = MemoryQueue::new();
        let start = Instant::now();
        let result = q.consume(0.05).await.unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn consume_returns_message_published_during_the_block_window() {
        let q = std::sync::Arc::new(MemoryQueue::new());
        let q2 = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            q2.publish(Message::new(json!({"n": 1}))).await.unwrap();
        });

        let result = q.consume(0.5).await.unwrap();
        assert_eq!(result.unwrap().body, json!({"n": 1}));
    }
}
