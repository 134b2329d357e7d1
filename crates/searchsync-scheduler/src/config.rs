//! Queue worker scheduling configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// How and where the queue worker ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone the cron expressions are evaluated in. Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Seconds granted to in-flight ticks on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// 6-field cron expression for queue ticks (every 10 seconds by default).
    #[serde(default = "default_queue_cron")]
    pub queue_cron: String,

    /// Owner marker written onto claimed jobs.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_queue_cron() -> String {
    "*/10 * * * * *".to_string()
}

fn default_worker_id() -> String {
    "searchsync-worker".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            queue_cron: default_queue_cron(),
            worker_id: default_worker_id(),
        }
    }
}

impl SchedulerConfig {
    /// # Errors
    ///
    /// `SchedulerError::InvalidTimezone` for anything that is not an IANA
    /// identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}
