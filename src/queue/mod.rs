// src/queue/mod.rs

//! FIFO message queue abstraction decoupling producers (callers enqueueing
//! run requests) from the [`crate::runner::WorkflowRunner`] that consumes
//! them.
//!
//! Unlike the state store, a queue is not required for correctness — a
//! caller can drive `Scheduler::run` directly — but it lets a runner pull
//! work at its own pace under the concurrency caps in
//! [`crate::config::RunnerConfig`] rather than having work pushed at it.

mod memory;
mod redis_queue;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MicroflowError;

pub type MessageId = Uuid;

/// One opaque unit of work. `body` is left to the caller's convention — in
/// practice a JSON-encoded run request (`run_id` + `workflow_name` +
/// initial context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: serde_json::Value,
}

impl Message {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
        }
    }
}

/// FIFO queue with at-least-once delivery: a consumed message stays
/// invisible to other consumers until `ack`ed or its visibility timeout
/// elapses, at which point it becomes available again.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MicroflowError>;

    /// Pop the next available message, blocking up to `block_timeout_s`
    /// for one to become available, marking it invisible for this queue's
    /// visibility timeout. Returns `None` if no message arrives before the
    /// timeout elapses. `block_timeout_s <= 0.0` returns immediately.
    async fn consume(&self, block_timeout_s: f64) -> Result<Option<Message>, MicroflowError>;

    /// Permanently remove a consumed message so it is not redelivered.
    async fn ack(&self, id: MessageId) -> Result<(), MicroflowError>;
}
