use std::time::Duration;

use crate::types::environment::Environment;
use crate::types::error::WorkerResult;
use crate::worker::types::AckPolicy;

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker tasks to spawn
    pub max_workers: usize,
    /// Maximum messages per receive call
    pub max_messages: i32,
    /// Long-poll wait per receive call
    pub wait_time: Duration,
    /// Slack on top of `wait_time` before a receive is abandoned
    pub receive_timeout_margin: Duration,
    /// Sleep after a failed receive
    pub receive_backoff: Duration,
    /// Upper bound for a delete call
    pub delete_timeout: Duration,
    /// Optional deadline for a single handler invocation
    pub handler_timeout: Option<Duration>,
    /// When handled messages are deleted
    pub ack_policy: AckPolicy,
    /// At most one in-flight message per group key across the pool
    pub group_exclusive: bool,
}

impl WorkerConfig {
    /// Creates a new `WorkerConfig` from the given environment
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::InvalidConfig` if the worker count or batch size
    /// is out of range
    pub fn from_environment(env: &Environment) -> WorkerResult<Self> {
        Ok(Self {
            max_workers: env.max_workers()?,
            max_messages: env.max_messages()?,
            wait_time: env.wait_time(),
            receive_backoff: env.receive_backoff(),
            delete_timeout: env.delete_timeout(),
            handler_timeout: env.handler_timeout(),
            ack_policy: env.ack_policy(),
            group_exclusive: env.group_exclusive(),
            ..Self::default()
        })
    }

    /// Upper bound for a receive call
    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        self.wait_time + self.receive_timeout_margin
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_messages: 1,
            wait_time: Duration::from_secs(20),
            receive_timeout_margin: Duration::from_secs(5),
            receive_backoff: Duration::from_secs(1),
            delete_timeout: Duration::from_secs(10),
            handler_timeout: None,
            ack_policy: AckPolicy::DeleteAlways,
            group_exclusive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;
    use crate::types::WorkerError;

    #[test]
    fn test_receive_timeout_includes_margin() {
        let config = WorkerConfig {
            wait_time: Duration::from_secs(20),
            ..WorkerConfig::default()
        };
        assert_eq!(config.receive_timeout(), Duration::from_secs(25));
    }

    #[test]
    #[serial]
    fn test_from_environment_rejects_out_of_range_sizes() {
        env::set_var("MAX_WORKERS", "0");
        let err = WorkerConfig::from_environment(&Environment::Development).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidConfig { key: "MAX_WORKERS", .. }));
        assert!(err.is_construction_error());
        env::remove_var("MAX_WORKERS");

        for batch in ["0", "11", "-3"] {
            env::set_var("MAX_MESSAGES", batch);
            let err = WorkerConfig::from_environment(&Environment::Development).unwrap_err();
            assert!(matches!(err, WorkerError::InvalidConfig { key: "MAX_MESSAGES", .. }));
        }

        env::set_var("MAX_MESSAGES", "10");
        let config = WorkerConfig::from_environment(&Environment::Development).unwrap();
        assert_eq!(config.max_messages, 10);
        env::remove_var("MAX_MESSAGES");
    }
}
