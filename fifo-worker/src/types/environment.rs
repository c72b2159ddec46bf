//! Environment configuration for different deployment stages

use std::{env, str::FromStr, time::Duration};

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use queue::QueueConfig;

use crate::types::error::{WorkerError, WorkerResult};
use crate::worker::types::AckPolicy;

/// `LocalStack` endpoint used in development
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development,
}

/// Maximum messages SQS returns from a single receive call
const MAX_SQS_BATCH: i32 = 10;

/// Reads an environment variable, treating empty or blank values as unset
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads an environment variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    non_empty_var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::InvalidEnvironment` if `APP_ENV` contains an invalid value
    pub fn from_env() -> WorkerResult<Self> {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(WorkerError::InvalidEnvironment(env)),
        }
    }

    /// Returns the endpoint URL to use for SQS
    ///
    /// `ENDPOINT_URL` overrides the default in every environment.
    #[must_use]
    pub fn override_sqs_endpoint_url(&self) -> Option<String> {
        non_empty_var("ENDPOINT_URL").or_else(|| match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development => Some(LOCALSTACK_ENDPOINT.to_string()),
        })
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        // Must outlast the longest long poll
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_sqs_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// Returns the queue URL
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::MissingConfig` if `SQS_QUEUE_URL` is not set in production/staging
    pub fn queue_url(&self) -> WorkerResult<String> {
        match (non_empty_var("SQS_QUEUE_URL"), self) {
            (Some(url), _) => Ok(url),
            (None, Self::Production | Self::Staging) => {
                Err(WorkerError::MissingConfig("SQS_QUEUE_URL"))
            }
            (None, Self::Development) => {
                Ok(format!("{LOCALSTACK_ENDPOINT}/000000000000/test-fifo-queue.fifo"))
            }
        }
    }

    /// Returns the queue configuration
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::MissingConfig` if the queue URL is missing
    pub fn queue_config(&self) -> WorkerResult<QueueConfig> {
        Ok(QueueConfig {
            queue_url: self.queue_url()?,
            visibility_timeout: self.visibility_timeout(),
        })
    }

    /// Number of concurrent workers
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::InvalidConfig` if `MAX_WORKERS` is zero
    pub fn max_workers(&self) -> WorkerResult<usize> {
        match env_or("MAX_WORKERS", 5) {
            0 => Err(WorkerError::InvalidConfig {
                key: "MAX_WORKERS",
                reason: "must be at least 1".to_string(),
            }),
            workers => Ok(workers),
        }
    }

    /// Visibility window requested for received messages
    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(env_or("VISIBILITY_TIMEOUT", 30))
    }

    /// Long-poll wait per receive call
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(env_or("WAIT_TIME_SECONDS", 20))
    }

    /// Maximum messages per receive call
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::InvalidConfig` if `MAX_MESSAGES` is outside 1..=10
    pub fn max_messages(&self) -> WorkerResult<i32> {
        let max_messages = env_or("MAX_MESSAGES", 1);
        if (1..=MAX_SQS_BATCH).contains(&max_messages) {
            Ok(max_messages)
        } else {
            Err(WorkerError::InvalidConfig {
                key: "MAX_MESSAGES",
                reason: format!("{max_messages} is outside 1..={MAX_SQS_BATCH}"),
            })
        }
    }

    /// Acknowledgement policy applied after each handling attempt
    #[must_use]
    pub fn ack_policy(&self) -> AckPolicy {
        env_or("ACK_POLICY", AckPolicy::DeleteAlways)
    }

    /// Sleep after a failed receive
    #[must_use]
    pub fn receive_backoff(&self) -> Duration {
        Duration::from_millis(env_or("RECEIVE_BACKOFF_MS", 1000))
    }

    /// Upper bound for a delete call
    #[must_use]
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(env_or("DELETE_TIMEOUT_MS", 10_000))
    }

    /// Optional deadline for a single handler invocation
    #[must_use]
    pub fn handler_timeout(&self) -> Option<Duration> {
        non_empty_var("HANDLER_TIMEOUT_MS")
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_millis)
    }

    /// Whether at most one message per group may be in flight across the pool
    #[must_use]
    pub fn group_exclusive(&self) -> bool {
        env_or("GROUP_EXCLUSIVE", true)
    }

    /// Artificial processing delay of the default handler
    #[must_use]
    pub fn handler_delay(&self) -> Duration {
        Duration::from_millis(env_or("HANDLER_DELAY_MS", 0))
    }

    /// Bound on the graceful drain after a shutdown signal
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(env_or("SHUTDOWN_TIMEOUT_SECS", 30))
    }

    /// Port of the health check server
    #[must_use]
    pub fn health_port(&self) -> u16 {
        env_or("PORT", 8001)
    }

    /// `DogStatsD` agent host, metrics are not exported when unset
    #[must_use]
    pub fn dd_agent_host(&self) -> Option<String> {
        non_empty_var("DD_AGENT_HOST")
    }

    /// Namespace prepended to every exported metric
    #[must_use]
    pub fn metrics_prefix(&self) -> String {
        non_empty_var("METRICS_PREFIX").unwrap_or_else(|| "fifo_worker".to_string())
    }

    /// Whether logs should be emitted as JSON
    #[must_use]
    pub const fn json_logs(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}
