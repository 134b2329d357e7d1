//! Retry policy for failed jobs.
//!
//! A failure is retried only when the job kind and the carried status code
//! are both allow-listed. The delay after the n-th failed attempt is
//! `unit * multiplier^n`, which with the defaults lands at 2, 10 and 50
//! minutes for attempts 1 to 3.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use tracing::warn;

use searchsync_types::RetrySettings;

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Park the job until `next_run_at`
    Retry { next_run_at: DateTime<Utc> },
    /// Leave the job broken
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Whether a failure of `kind` carrying `status` is transient.
    pub fn is_retryable(&self, kind: &str, status: Option<u16>) -> bool {
        self.settings.retryable_jobs.iter().any(|k| k == kind)
            && status.is_some_and(|code| self.settings.retryable_status_codes.contains(&code))
    }

    /// Delay before the next attempt once `attempts` have failed.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let unit = Duration::from_secs(self.settings.backoff_unit_secs);
        let multiplier = self.settings.backoff_multiplier;
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(unit.saturating_mul(multiplier))
            .with_randomization_factor(0.0)
            .with_multiplier(f64::from(multiplier))
            .with_max_interval(Duration::from_secs(u64::from(u32::MAX)))
            .with_max_elapsed_time(None)
            .build();

        let mut delay = Duration::ZERO;
        for _ in 0..attempts {
            delay = backoff.next_backoff().unwrap_or(delay);
        }
        delay
    }

    /// Decide what happens after a failure. `attempts` already counts it.
    pub fn decide(&self, kind: &str, status: Option<u16>, attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if !self.is_retryable(kind, status) {
            warn!(kind, status = ?status, "Job failure is not retryable");
            return RetryDecision::GiveUp;
        }
        if attempts >= self.settings.max_attempts {
            warn!(kind, attempts, "Job exhausted its retry budget");
            return RetryDecision::GiveUp;
        }

        let delay = self.delay_for(attempts);
        let next_run_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        warn!(
            kind,
            attempts,
            delay_secs = delay.as_secs(),
            %next_run_at,
            "Rescheduling failed job"
        );
        RetryDecision::Retry { next_run_at }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2 * 60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10 * 60));
        assert_eq!(policy.delay_for(3), Duration::from_secs(50 * 60));
    }

    #[test]
    fn test_reschedules_within_budget() {
        let policy = RetryPolicy::default();
        for (attempts, minutes) in [(1, 2), (2, 10), (3, 50)] {
            assert_eq!(
                policy.decide("index", Some(504), attempts, now()),
                RetryDecision::Retry {
                    next_run_at: now() + chrono::Duration::minutes(minutes)
                }
            );
        }
    }

    #[test]
    fn test_gives_up_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide("index", Some(408), 4, now()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_only_allow_listed_failures_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide("index", Some(500), 1, now()), RetryDecision::GiveUp);
        assert_eq!(policy.decide("index", None, 1, now()), RetryDecision::GiveUp);

        let policy = RetryPolicy::new(RetrySettings {
            retryable_jobs: vec!["reindex".into()],
            ..RetrySettings::default()
        });
        assert!(!policy.is_retryable("clear_index", Some(504)));
        assert!(policy.is_retryable("reindex", Some(504)));
    }
}
