//! Executor configuration.
//!
//! All values are fixed when an executor is built; there is no runtime
//! adjustment.
//!
//! # Environment Variables
//!
//! - `PROCMUX_MAX_TASKS` - Maximum concurrent children per worker loop
//! - `PROCMUX_READINESS` - Readiness strategy: poll, sleep

use crate::error::{ProcmuxError, Result};
use crate::exec::readiness::ReadinessMode;
use std::time::Duration;

/// Default bound on concurrently running children per worker loop.
pub const MAX_TASKS_PER_THREAD: usize = 128;

/// Default bytes read from a plugin pipe per servicing step.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 512;

/// Upper bound on one readiness wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Sleep between sweeps when no readiness primitive is used.
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for an [`Executor`](crate::exec::Executor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of children running at once.
    pub max_tasks_per_thread: usize,
    /// Bytes read per servicing step.
    pub read_chunk_size: usize,
    /// Upper bound on one readiness wait.
    pub poll_timeout: Duration,
    /// Sleep used by the fallback readiness strategy.
    pub fallback_interval: Duration,
    /// Readiness strategy.
    pub readiness: ReadinessMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_thread: MAX_TASKS_PER_THREAD,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
            readiness: ReadinessMode::Poll,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency bound.
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks_per_thread = max_tasks;
        self
    }

    /// Set the per-step read size.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Set the readiness wait bound.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the readiness strategy.
    pub fn with_readiness(mut self, mode: ReadinessMode) -> Self {
        self.readiness = mode;
        self
    }

    /// Set the fallback sleep interval.
    pub fn with_fallback_interval(mut self, interval: Duration) -> Self {
        self.fallback_interval = interval;
        self
    }

    /// Apply `PROCMUX_MAX_TASKS` and `PROCMUX_READINESS` from the process
    /// environment. Unparseable values are ignored with a warning.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("PROCMUX_MAX_TASKS") {
            match value.trim().parse::<usize>() {
                Ok(max) => self.max_tasks_per_thread = max,
                Err(_) => tracing::warn!(value = %value, "Ignoring invalid PROCMUX_MAX_TASKS"),
            }
        }

        if let Some(value) = lookup("PROCMUX_READINESS") {
            match value.parse() {
                Ok(mode) => self.readiness = mode,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid PROCMUX_READINESS"),
            }
        }

        self
    }

    /// Reject settings the worker loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks_per_thread == 0 {
            return Err(ProcmuxError::InvalidConfig(
                "max_tasks_per_thread must be at least 1".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(ProcmuxError::InvalidConfig(
                "read_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(ProcmuxError::InvalidConfig(
                "poll_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_tasks_per_thread, 128);
        assert_eq!(config.read_chunk_size, 512);
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
        assert_eq!(config.readiness, ReadinessMode::Poll);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .with_max_tasks(4)
            .with_read_chunk_size(64)
            .with_poll_timeout(Duration::from_millis(200))
            .with_readiness(ReadinessMode::Sleep)
            .with_fallback_interval(Duration::from_millis(10));

        assert_eq!(config.max_tasks_per_thread, 4);
        assert_eq!(config.read_chunk_size, 64);
        assert_eq!(config.poll_timeout, Duration::from_millis(200));
        assert_eq!(config.readiness, ReadinessMode::Sleep);
        assert_eq!(config.fallback_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_env_overrides() {
        let config = ExecutorConfig::default().with_overrides_from(lookup(&[
            ("PROCMUX_MAX_TASKS", "16"),
            ("PROCMUX_READINESS", "sleep"),
        ]));
        assert_eq!(config.max_tasks_per_thread, 16);
        assert_eq!(config.readiness, ReadinessMode::Sleep);
    }

    #[test]
    fn test_invalid_env_overrides_ignored() {
        let config = ExecutorConfig::default().with_overrides_from(lookup(&[
            ("PROCMUX_MAX_TASKS", "lots"),
            ("PROCMUX_READINESS", "kqueue"),
        ]));
        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let err = ExecutorConfig::default().with_max_tasks(0).validate().unwrap_err();
        assert!(err.to_string().contains("max_tasks_per_thread"));
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        assert!(
            ExecutorConfig::default()
                .with_read_chunk_size(0)
                .validate()
                .is_err()
        );
    }
}
