//! Worker configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use campo_core::backoff::RetryPolicy;
use campo_push::GatewayConfig;

/// Errors raised while reading the worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: \"{value}\"")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{first} must be shorter than {second}")]
    NotShorter {
        first: &'static str,
        second: &'static str,
    },
}

/// Runtime settings of the notification worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Sleep between claim attempts when the queue is not saturated.
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each poll.
    pub poll_jitter: Duration,
    /// Maximum jobs claimed per poll.
    pub batch_size: u32,
    /// Maximum push sends in flight across the whole process.
    pub concurrency: usize,
    pub retry_policy: RetryPolicy,
    /// Upper bound for a single push send.
    pub send_timeout: Duration,
    /// Upper bound for delivering one job to all of its recipients.
    pub processing_timeout: Duration,
    /// In-flight jobs untouched for longer than this are returned to pending.
    pub stuck_timeout: Duration,
    /// Period of stuck recovery and retention cleanup.
    pub cleanup_interval: Duration,
    /// Age after which terminal jobs are deleted.
    pub retention_days: i32,
    /// Subscriptions whose error count exceeds this are skipped and pruned.
    pub subscription_error_ceiling: i32,
    pub push_ttl: Duration,
    /// How long shutdown waits for background tasks to finish.
    pub shutdown_grace: Duration,
    pub gateway: GatewayConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default  |
    /// |-------------------------------------|----------|
    /// | `DATABASE_URL`                      | required |
    /// | `DATABASE_MAX_CONNECTIONS`          | `10`     |
    /// | `NOTIFY_POLL_INTERVAL_MS`           | `1000`   |
    /// | `NOTIFY_POLL_JITTER_MS`             | `100`    |
    /// | `NOTIFY_BATCH_SIZE`                 | `30`     |
    /// | `NOTIFY_CONCURRENCY`                | `12`     |
    /// | `NOTIFY_RETRY_BASE_MS`              | `2000`   |
    /// | `NOTIFY_RETRY_MAX_MS`               | `120000` |
    /// | `NOTIFY_SEND_TIMEOUT_MS`            | `10000`  |
    /// | `NOTIFY_PROCESSING_TIMEOUT_MS`      | `30000`  |
    /// | `NOTIFY_STUCK_TIMEOUT_MINUTES`      | `10`     |
    /// | `NOTIFY_CLEANUP_INTERVAL_SECS`      | `3600`   |
    /// | `NOTIFY_RETENTION_DAYS`             | `7`      |
    /// | `NOTIFY_SUBSCRIPTION_ERROR_CEILING` | `5`      |
    /// | `NOTIFY_PUSH_TTL_SECS`              | `86400`  |
    /// | `NOTIFY_SHUTDOWN_GRACE_SECS`        | `10`     |
    /// | `PUSH_GATEWAY_URL`                  | required |
    /// | `PUSH_GATEWAY_TOKEN`                | unset    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let batch_size: u32 = vars.parse("NOTIFY_BATCH_SIZE", 30)?;
        if batch_size == 0 {
            return Err(ConfigError::Zero("NOTIFY_BATCH_SIZE"));
        }
        let concurrency: usize = vars.parse("NOTIFY_CONCURRENCY", 12)?;
        if concurrency == 0 {
            return Err(ConfigError::Zero("NOTIFY_CONCURRENCY"));
        }

        let cleanup_interval_secs: u64 = vars.parse("NOTIFY_CLEANUP_INTERVAL_SECS", 3600)?;
        if cleanup_interval_secs == 0 {
            return Err(ConfigError::Zero("NOTIFY_CLEANUP_INTERVAL_SECS"));
        }

        // A job still being processed must never look stuck to recovery.
        let processing_timeout = vars.millis("NOTIFY_PROCESSING_TIMEOUT_MS", 30_000)?;
        let stuck_timeout = Duration::from_secs(
            vars.parse::<u64>("NOTIFY_STUCK_TIMEOUT_MINUTES", 10)?
                .saturating_mul(60),
        );
        if processing_timeout >= stuck_timeout {
            return Err(ConfigError::NotShorter {
                first: "NOTIFY_PROCESSING_TIMEOUT_MS",
                second: "NOTIFY_STUCK_TIMEOUT_MINUTES",
            });
        }

        let send_timeout = vars.millis("NOTIFY_SEND_TIMEOUT_MS", 10_000)?;
        let gateway = GatewayConfig {
            url: vars.required("PUSH_GATEWAY_URL")?,
            token: vars.optional("PUSH_GATEWAY_TOKEN"),
            request_timeout: send_timeout,
        };

        Ok(Self {
            database_url: vars.required("DATABASE_URL")?,
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10)?,
            poll_interval: vars.millis("NOTIFY_POLL_INTERVAL_MS", 1000)?,
            poll_jitter: vars.millis("NOTIFY_POLL_JITTER_MS", 100)?,
            batch_size,
            concurrency,
            retry_policy: RetryPolicy::new(
                vars.millis("NOTIFY_RETRY_BASE_MS", 2000)?,
                vars.millis("NOTIFY_RETRY_MAX_MS", 120_000)?,
            ),
            send_timeout,
            processing_timeout,
            stuck_timeout,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            retention_days: vars.non_negative("NOTIFY_RETENTION_DAYS", 7)?,
            subscription_error_ceiling: vars.non_negative("NOTIFY_SUBSCRIPTION_ERROR_CEILING", 5)?,
            push_ttl: Duration::from_secs(vars.parse("NOTIFY_PUSH_TTL_SECS", 86_400)?),
            shutdown_grace: Duration::from_secs(vars.parse("NOTIFY_SHUTDOWN_GRACE_SECS", 10)?),
            gateway,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn non_negative(&self, key: &'static str, default: i32) -> Result<i32, ConfigError> {
        let value = self.parse(key, default)?;
        if value < 0 {
            return Err(ConfigError::Invalid { key, value: value.to_string() });
        }
        Ok(value)
    }

    fn millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(key, default).map(Duration::from_millis)
    }
}
