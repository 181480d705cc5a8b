// src/config.rs

//! Environment-derived runner configuration.
//!
//! Mirrors a `ConfigSection`/`TaskConfig` shape: a plain struct of resolved
//! values plus a `from_env` constructor, rather than a global or
//! lazily-initialized singleton.

use std::env;

/// Default cap on concurrent runs within one `WorkflowRunner` when
/// `MICROFLOW_MAX_CONCURRENT_WORKFLOWS` is absent or unparseable.
pub const DEFAULT_MAX_CONCURRENT_WORKFLOWS: usize = 8;
/// Default cap on concurrent task attempts within one `WorkflowRunner` when
/// `MICROFLOW_MAX_CONCURRENT_TASKS` is absent or unparseable.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 32;

/// Which backend [`crate::queue::Queue`]/[`crate::store::StateStore`]
/// implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Memory,
    Redis,
}

/// Resolved runner configuration, read once at startup via [`RunnerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// `None` means unbounded: no more than this many runs execute
    /// concurrently within one `WorkflowRunner`. Defaults to
    /// [`DEFAULT_MAX_CONCURRENT_WORKFLOWS`]; only an explicit zero or
    /// negative value disables the cap.
    pub max_concurrent_workflows: Option<usize>,
    /// `None` means unbounded: no more than this many task attempts execute
    /// concurrently across all runs within one `WorkflowRunner`. Defaults to
    /// [`DEFAULT_MAX_CONCURRENT_TASKS`]; only an explicit zero or negative
    /// value disables the cap.
    pub max_concurrent_tasks: Option<usize>,
    pub queue_provider: Provider,
    pub redis_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: Some(DEFAULT_MAX_CONCURRENT_WORKFLOWS),
            max_concurrent_tasks: Some(DEFAULT_MAX_CONCURRENT_TASKS),
            queue_provider: Provider::Memory,
            redis_url: None,
        }
    }
}

impl RunnerConfig {
    /// Resolve configuration from the process environment.
    ///
    /// A cap variable that is absent or unparseable falls back to its
    /// compiled-in default — an operator typo should not prevent the
    /// runner from starting. An explicit zero or negative value disables
    /// that cap (`None`, unbounded). `QUEUE_PROVIDER=redis` selects the
    /// Redis backend; anything else, including an absent variable, selects
    /// the in-memory backend.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_workflows: read_cap(
                "MICROFLOW_MAX_CONCURRENT_WORKFLOWS",
                DEFAULT_MAX_CONCURRENT_WORKFLOWS,
            ),
            max_concurrent_tasks: read_cap(
                "MICROFLOW_MAX_CONCURRENT_TASKS",
                DEFAULT_MAX_CONCURRENT_TASKS,
            ),
            queue_provider: match env::var("QUEUE_PROVIDER").as_deref() {
                Ok("redis") => Provider::Redis,
                _ => Provider::Memory,
            },
            redis_url: env::var("REDIS_URL").ok(),
        }
    }

    pub fn effective_max_concurrent_workflows(&self) -> Option<usize> {
        self.max_concurrent_workflows
    }

    pub fn effective_max_concurrent_tasks(&self) -> Option<usize> {
        self.max_concurrent_tasks
    }
}

/// Absent or unparseable yields `default`; an explicit value `<= 0`
/// disables the cap (`None`); any other value is the cap itself.
fn read_cap(key: &str, default: usize) -> Option<usize> {
    match env::var(key) {
        Ok(raw) => match raw.parse::<i64>() {
            Ok(value) if value > 0 => Some(value as usize),
            Ok(_) => None,
            Err(_) => Some(default),
        },
        Err(_) => Some(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_default_caps_and_memory_backend() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.max_concurrent_workflows, Some(DEFAULT_MAX_CONCURRENT_WORKFLOWS));
        assert_eq!(cfg.max_concurrent_tasks, Some(DEFAULT_MAX_CONCURRENT_TASKS));
        assert_eq!(cfg.queue_provider, Provider::Memory);
    }

    #[test]
    fn read_cap_disables_on_zero_and_negative_defaults_on_absent_and_garbage() {
        // SAFETY: tests run single-threaded within this module's env var keys.
        unsafe {
            env::set_var("TEST_MICROFLOW_CAP", "0");
        }
        assert_eq!(read_cap("TEST_MICROFLOW_CAP", 8), None);

        unsafe {
            env::set_var("TEST_MICROFLOW_CAP", "-3");
        }
        assert_eq!(read_cap("TEST_MICROFLOW_CAP", 8), None);

        unsafe {
            env::set_var("TEST_MICROFLOW_CAP", "nope");
        }
        assert_eq!(read_cap("TEST_MICROFLOW_CAP", 8), Some(8));

        unsafe {
            env::set_var("TEST_MICROFLOW_CAP", "4");
        }
        assert_eq!(read_cap("TEST_MICROFLOW_CAP", 8), Some(4));

        unsafe {
            env::remove_var("TEST_MICROFLOW_CAP");
        }
        assert_eq!(read_cap("TEST_MICROFLOW_CAP", 8), Some(8));
    }
}
