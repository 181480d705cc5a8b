// src/store/file.rs

//! JSON-file-backed [`StateStore`].
//!
//! One document per run under `<data_dir>/runs/<run_id>.json`. Per-run_id
//! mutual exclusion uses a `DashMap` of `tokio::sync::Mutex`es keyed by
//! `run_id`, the same "one lock per key" shape used elsewhere in the
//! codebase for per-resource contention, so unrelated runs never block each
//! other. Writes go to a `NamedTempFile` in the same directory and are
//! `persist`ed over the target path, so a reader never observes a
//! partially-written document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::MicroflowError;
use crate::record::{Run, TaskRecord};

use super::{apply_task_upsert, StateStore};

pub struct FileStateStore {
    data_dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileStateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: DashMap::new(),
        }
    }

    fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    fn lock_for(&self, run_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_run(&self, path: &Path) -> Result<Option<Run>, MicroflowError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let run: Run = serde_json::from_slice(&bytes)
                    .map_err(|e| MicroflowError::StoreError(format!("corrupt run document: {e}")))?;
                Ok(Some(run))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MicroflowError::StoreError(format!(
                "failed to read run document: {e}"
            ))),
        }
    }

    async fn write_run(&self, run: &Run) -> Result<(), MicroflowError> {
        let dir = self.runs_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MicroflowError::StoreError(format!("failed to create run dir: {e}")))?;

        let body = serde_json::to_vec_pretty(run)
            .map_err(|e| MicroflowError::StoreError(format!("failed to serialize run: {e}")))?;
        let target = self.path_for(&run.run_id);

        let dir_for_blocking = dir.clone();
        let target_for_blocking = target.clone();
        tokio::task::spawn_blocking(move || -> Result<(), MicroflowError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir_for_blocking).map_err(|e| {
                MicroflowError::StoreError(format!("failed to create temp file: {e}"))
            })?;
            use std::io::Write;
            tmp.write_all(&body)
                .map_err(|e| MicroflowError::StoreError(format!("failed to write temp file: {e}")))?;
            tmp.persist(&target_for_blocking)
                .map_err(|e| MicroflowError::StoreError(format!("failed to persist run file: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| MicroflowError::StoreError(format!("write task panicked: {e}")))??;

        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_run(&self, run_id: &str) -> Result<Option<Run>, MicroflowError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        self.read_run(&self.path_for(run_id)).await
    }

    async fn save_run(&self, run: &Run) -> Result<(), MicroflowError> {
        let lock = self.lock_for(&run.run_id);
        let _guard = lock.lock().await;
        self.write_run(run).await
    }

    async fn update_ctx(&self, run_id: &str, delta: Context) -> Result<(), MicroflowError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;

        let mut run = self
            .read_run(&self.path_for(run_id))
            .await?
            .ok_or_else(|| MicroflowError::StoreError(format!("no such run '{run_id}'")))?;

        crate::context::merge_context(&mut run.ctx, delta);
        run.updated_at = chrono::Utc::now();
        self.write_run(&run).await
    }

    async fn upsert_task(&self, run_id: &str, task: TaskRecord) -> Result<(), MicroflowError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;

        let mut run = self
            .read_run(&self.path_for(run_id))
            .await?
            .ok_or_else(|| MicroflowError::StoreError(format!("no such run '{run_id}'")))?;

        apply_task_upsert(&mut run, task);
        run.updated_at = chrono::Utc::now();
        self.write_run(&run).await
    }

    async fn list_runs(&self) -> Result<Vec<String>, MicroflowError> {
        let dir = self.runs_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MicroflowError::StoreError(format!(
                    "failed to list run dir: {e}"
                )))
            }
        };

        let mut run_ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MicroflowError::StoreError(format!("failed to read run dir entry: {e}")))?
        {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    run_ids.push(stem.to_string());
                }
            }
        }
        run_ids.sort();
        Ok(run_ids)
    }
}
