use crate::config::env::env;
use std::time::Duration;

/// Process-wide runtime settings: scheduler sweep intervals, webhook retry
/// backoff, and where per-app database files live.
///
/// Everything here is a default used by every app; an app's metadata can
/// still override its own webhook-specific retry policy per webhook row.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding one SQLite file per app (`{data_dir}/{app}.db`) when
    /// an app doesn't set an explicit connection string.
    pub data_dir: String,
    pub workflow_timeout_sweep_secs: u64,
    pub webhook_retry_sweep_secs: u64,
    pub event_retention_sweep_secs: u64,
    /// How long a completed workflow instance's history is kept before the
    /// retention sweep deletes it.
    pub event_retention_days: i64,
    /// Base delay for exponential webhook retry backoff.
    pub webhook_retry_base_secs: u64,
    pub webhook_retry_max_attempts: u32,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env("ROCKET_DATA_DIR", "./data".to_string()),
            workflow_timeout_sweep_secs: env("ROCKET_WORKFLOW_SWEEP_SECS", 60),
            webhook_retry_sweep_secs: env("ROCKET_WEBHOOK_SWEEP_SECS", 30),
            event_retention_sweep_secs: env("ROCKET_RETENTION_SWEEP_SECS", 3600),
            event_retention_days: env("ROCKET_EVENT_RETENTION_DAYS", 90),
            webhook_retry_base_secs: env("ROCKET_WEBHOOK_RETRY_BASE_SECS", 30),
            webhook_retry_max_attempts: env("ROCKET_WEBHOOK_RETRY_MAX_ATTEMPTS", 5),
        }
    }

    pub fn workflow_timeout_sweep(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_sweep_secs)
    }

    pub fn webhook_retry_sweep(&self) -> Duration {
        Duration::from_secs(self.webhook_retry_sweep_secs)
    }

    pub fn event_retention_sweep(&self) -> Duration {
        Duration::from_secs(self.event_retention_sweep_secs)
    }

    /// Exponential backoff delay before retry attempt `attempt` (1-indexed).
    pub fn webhook_retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.webhook_retry_base_secs.saturating_mul(1 << attempt.min(10)))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
