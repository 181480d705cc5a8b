// src/store/redis_store.rs

//! Redis-backed [`StateStore`].
//!
//! One string entry per run keyed `microflow:run:<run_id>`, holding the
//! JSON-serialized [`Run`]. Read-modify-write operations use a
//! `WATCH`/`MULTI`/`EXEC` optimistic-transaction loop: watch the key, read
//! it, apply the mutation in memory, then attempt the transactional write.
//! A concurrent writer invalidates the watch and the transaction fails with
//! `None`, at which point the loop retries from the read. This is the same
//! compare-and-swap shape the `FileStateStore` gets for free from its
//! per-run_id mutex, expressed the way Redis wants it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::context::Context;
use crate::error::MicroflowError;
use crate::record::{Run, TaskRecord};

use super::{apply_task_upsert, StateStore};

const MAX_CAS_ATTEMPTS: u32 = 10;

pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> Result<Self, MicroflowError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| MicroflowError::StoreError(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| MicroflowError::StoreError(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }

    fn key(run_id: &str) -> String {
        format!("microflow:run:{run_id}")
    }

    /// Load, apply `mutate`, and transactionally store back, retrying on
    /// concurrent-writer conflicts up to `MAX_CAS_ATTEMPTS` times.
    async fn read_modify_write<F>(&self, run_id: &str, mutate: F) -> Result<(), MicroflowError>
    where
        F: Fn(&mut Run) -> Result<(), MicroflowError>,
    {
        let key = Self::key(run_id);
        let mut conn = self.conn.clone();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let _: () = redis::cmd("WATCH")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| MicroflowError::StoreError(format!("redis WATCH failed: {e}")))?;

            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| MicroflowError::StoreError(format!("redis GET failed: {e}")))?;

            let mut run = match raw {
                Some(s) => serde_json::from_str::<Run>(&s)
                    .map_err(|e| MicroflowError::StoreError(format!("corrupt run document: {e}")))?,
                None => {
                    let _: () = redis::cmd("UNWATCH")
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| MicroflowError::StoreError(format!("redis UNWATCH failed: {e}")))?;
                    return Err(MicroflowError::StoreError(format!("no such run '{run_id}'")));
                }
            };

            mutate(&mut run)?;
            run.updated_at = chrono::Utc::now();
            let body = serde_json::to_string(&run)
                .map_err(|e| MicroflowError::StoreError(format!("failed to serialize run: {e}")))?;

            let mut pipe = redis::pipe();
            pipe.atomic().set(&key, body);

            let result: Option<()> = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| MicroflowError::StoreError(format!("redis EXEC failed: {e}")))?;

            if result.is_some() {
                return Ok(());
            }
            // Transaction aborted because the key changed under us; retry.
        }

        Err(MicroflowError::StoreError(format!(
            "redis CAS exceeded {MAX_CAS_ATTEMPTS} attempts for run '{run_id}'"
        )))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load_run(&self, run_id: &str) -> Result<Option<Run>, MicroflowError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(run_id))
            .await
            .map_err(|e| MicroflowError::StoreError(format!("redis GET failed: {e}")))?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| MicroflowError::StoreError(format!("corrupt run document: {e}")))
        })
        .transpose()
    }

    async fn save_run(&self, run: &Run) -> Result<(), MicroflowError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(run)
            .map_err(|e| MicroflowError::StoreError(format!("failed to serialize run: {e}")))?;
        let _: () = conn
            .set(Self::key(&run.run_id), body)
            .await
            .map_err(|e| MicroflowError::StoreError(format!("redis SET failed: {e}")))?;
        Ok(())
    }

    async fn update_ctx(&self, run_id: &str, delta: Context) -> Result<(), MicroflowError> {
        self.read_modify_write(run_id, |run| {
            crate::context::merge_context(&mut run.ctx, delta.clone());
            Ok(())
        })
        .await
    }

    async fn upsert_task(&self, run_id: &str, task: TaskRecord) -> Result<(), MicroflowError> {
        self.read_modify_write(run_id, |run| {
            apply_task_upsert(run, task.clone());
            Ok(())
        })
        .await
    }

    async fn list_runs(&self) -> Result<Vec<String>, MicroflowError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys("microflow:run:*")
            .await
            .map_err(|e| MicroflowError::StoreError(format!("redis KEYS failed: {e}")))?;

        let mut run_ids: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("microflow:run:").map(str::to_string))
            .collect();
        run_ids.sort();
        Ok(run_ids)
    }
}
