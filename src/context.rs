// src/context.rs

//! The shared, string-keyed mapping carried between tasks within a run.
//!
//! A run owns its [`Context`] exclusively. Tasks never mutate it directly:
//! a task's `fn` receives a snapshot and returns a delta, and the scheduler
//! merges that delta back through the state store (see [`crate::store`]).
//! This module only implements the pure merge rule; serialization and
//! locking live in the store.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::MicroflowError;
use crate::task::TaskName;

/// Mapping from string keys to JSON-representable values.
///
/// Backed by an [`IndexMap`] rather than a `HashMap` so that snapshots and
/// the persisted `ctx` object serialize with a stable, insertion-ordered
/// key sequence — useful for dry-run output and deterministic test
/// fixtures, and free in practice since contexts are small.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Context(IndexMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Build a context from a task's returned delta.
    ///
    /// `fn`s return a plain [`serde_json::Value`] so that callers can
    /// build one with `serde_json::json!({...})` or `serde_json::to_value`
    /// on their own serializable type. The contract requires the top-level
    /// shape to be a JSON object (a mapping), matching the string-keyed
    /// `Context`; anything else cannot be merged and is a
    /// [`MicroflowError::SerializationError`].
    pub fn from_task_output(
        task: &TaskName,
        value: Value,
    ) -> std::result::Result<Self, MicroflowError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(MicroflowError::SerializationError {
                task: task.clone(),
                message: format!(
                    "task output must be a JSON object to merge into context, got {other}"
                ),
            }),
        }
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        Value::Object(ctx.0.into_iter().collect())
    }
}

/// Merge `delta` into `base`: shallow, last-writer-wins at the top level.
///
/// This is a contract, not an accident: a task returning `{"items": [1]}`
/// overwrites any prior `items` wholesale. Implementers must not deep-merge
/// so that tasks can reason about observable context without worrying
/// about nested-key survival.
pub fn merge_context(base: &mut Context, delta: Context) {
    for (key, value) in delta.0 {
        base.0.insert(key, value);
    }
}
