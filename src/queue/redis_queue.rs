// src/queue/redis_queue.rs

//! Redis-backed [`Queue`] using the standard reliable-queue pattern:
//! `RPOPLPUSH` moves a message from the ready list to a processing list
//! atomically, so a consumer that crashes mid-processing never loses the
//! message outright — it simply sits in the processing list until the
//! background reaper notices its visibility timeout has elapsed and moves
//! it back onto the ready list.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::MicroflowError;

use super::{Message, MessageId, Queue};

const READY_LIST: &str = "microflow:queue:ready";
const PROCESSING_LIST: &str = "microflow:queue:processing";
const DEADLINE_HASH: &str = "microflow:queue:deadlines";

pub struct RedisQueue {
    conn: ConnectionManager,
    visibility_timeout: Duration,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, MicroflowError> {
        Self::connect_with_visibility_timeout(redis_url, Duration::from_secs(30)).await
    }

    pub async fn connect_with_visibility_timeout(
        redis_url: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, MicroflowError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| MicroflowError::QueueError(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| MicroflowError::QueueError(format!("failed to connect to redis: {e}")))?;
        Ok(Self {
            conn,
            visibility_timeout,
        })
    }

    /// Move any processing-list entry whose visibility timeout has expired
    /// back onto the ready list. Intended to be driven by a periodic
    /// background task (`tokio::time::interval`) owned by the caller; not
    /// invoked automatically by `consume` since the reliable-queue pattern
    /// assumes a single reaper watching the whole processing list, not one
    /// reap-per-consume.
    pub async fn reap_expired(&self) -> Result<usize, MicroflowError> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp();

        let entries: Vec<String> = conn
            .lrange(PROCESSING_LIST, 0, -1)
            .await
            .map_err(|e| MicroflowError::QueueError(format!("redis LRANGE failed: {e}")))?;

        let mut reaped = 0;
        for raw in entries {
            let deadline: Option<i64> = conn
                .hget(DEADLINE_HASH, &raw)
                .await
                .map_err(|e| MicroflowError::QueueError(format!("redis HGET failed: {e}")))?;

            let Some(deadline) = deadline else { continue };
            if now < deadline {
                continue;
            }

            let removed: i32 = conn
                .lrem(PROCESSING_LIST, 1, &raw)
                .await
                .map_err(|e| MicroflowError::QueueError(format!("redis LREM failed: {e}")))?;
            if removed > 0 {
                let _: () = conn
                    .rpush(READY_LIST, &raw)
                    .await
                    .map_err(|e| MicroflowError::QueueError(format!("redis RPUSH failed: {e}")))?;
                let _: () = conn
                    .hdel(DEADLINE_HASH, &raw)
                    .await
                    .map_err(|e| MicroflowError::QueueError(format!("redis HDEL failed: {e}")))?;
                reaped += 1;
            }
        }

        Ok(reaped)
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn publish(&self, message: Message) -> Result<(), MicroflowError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(&message)
            .map_err(|e| MicroflowError::QueueError(format!("failed to serialize message: {e}")))?;
        let _: () = conn
            .rpush(READY_LIST, body)
            .await
            .map_err(|e| MicroflowError::QueueError(format!("redis RPUSH failed: {e}")))?;
        Ok(())
    }

    async fn consume(&self, block_timeout_s: f64) -> Result<Option<Message>, MicroflowError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = if block_timeout_s > 0.0 {
            // BRPOPLPUSH's timeout is whole seconds and 0 means "block
            // forever," so round up to at least one second rather than
            // passing a sub-second value through unchanged.
            let timeout_secs = (block_timeout_s.ceil() as usize).max(1);
            conn.brpoplpush(READY_LIST, PROCESSING_LIST, timeout_secs as f64)
                .await
                .map_err(|e| MicroflowError::QueueError(format!("redis BRPOPLPUSH failed: {e}")))?
        } else {
            conn.rpoplpush(READY_LIST, PROCESSING_LIST)
                .await
                .map_err(|e| MicroflowError::QueueError(format!("redis RPOPLPUSH failed: {e}")))?
        };

        let Some(raw) = raw else { return Ok(None) };

        let deadline = chrono::Utc::now().timestamp() + self.visibility_timeout.as_secs() as i64;
        let _: () = conn
            .hset(DEADLINE_HASH, &raw, deadline)
            .await
            .map_err(|e| MicroflowError::QueueError(format!("redis HSET failed: {e}")))?;

        let message: Message = serde_json::from_str(&raw)
            .map_err(|e| MicroflowError::QueueError(format!("corrupt queue message: {e}")))?;
        Ok(Some(message))
    }

    async fn ack(&self, id: MessageId) -> Result<(), MicroflowError> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn
            .lrange(PROCESSING_LIST, 0, -1)
            .await
            .map_err(|e| MicroflowError::QueueError(format!("redis LRANGE failed: {e}")))?;

        for raw in entries {
            let Ok(message) = serde_json::from_str::<Message>(&raw) else {
                continue;
            };
            if message.id == id {
                let _: i32 = conn
                    .lrem(PROCESSING_LIST, 1, &raw)
                    .await
                    .map_err(|e| MicroflowError::QueueError(format!("redis LREM failed: {e}")))?;
                let _: () = conn
                    .hdel(DEADLINE_HASH, &raw)
                    .await
                    .map_err(|e| MicroflowError::QueueError(format!("redis HDEL failed: {e}")))?;
                return Ok(());
            }
        }

        Ok(())
    }
}
