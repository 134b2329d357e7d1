//! Cron service that drives the job queue.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::{SchedulerConfig, SchedulerError};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Check a 6-field cron expression (sec min hour day month weekday).
///
/// # Example
///
/// ```
/// use searchsync_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("*/10 * * * * *").is_ok());
/// assert!(validate_cron_expression("every ten seconds").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
}

/// Decrements the in-flight tick count on drop.
struct TickGuard(Arc<AtomicUsize>);

impl TickGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the cron scheduler and the cancellation token handed to every tick.
pub struct SchedulerService {
    cron: JobScheduler,
    config: SchedulerConfig,
    token: CancellationToken,
    running: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl SchedulerService {
    /// Create a stopped scheduler. The default timezone is validated here.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        Ok(Self {
            cron: JobScheduler::new().await?,
            config,
            token: CancellationToken::new(),
            running: AtomicBool::new(false),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// # Errors
    ///
    /// `SchedulerError::AlreadyRunning` when started twice.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.cron.start().await?;
        info!(timezone = %self.config.default_timezone, "Scheduler started");
        Ok(())
    }

    /// Cancel the shared token, wait up to `shutdown_timeout_secs` for
    /// in-flight ticks, then stop the cron scheduler.
    ///
    /// # Errors
    ///
    /// `SchedulerError::NotRunning` when not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        self.token.cancel();
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    "Shutdown timeout reached with ticks still running"
                );
                break;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        if let Err(e) = self.cron.shutdown().await {
            warn!(error = %e, "Error stopping cron scheduler");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ticks currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a timezone-aware cron job.
    ///
    /// `timezone` falls back to the configured default. Ticks pass through an
    /// [`OverlapGuard`] built from `policy` and receive the shutdown token.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        policy: OverlapPolicy,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tz = match timezone {
            Some(tz) => Self::parse_timezone(tz)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        let guard = Arc::new(OverlapGuard::new(policy));
        let in_flight = Arc::clone(&self.in_flight);
        let token = self.token.clone();
        let label = name.to_string();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let guard = Arc::clone(&guard);
            let in_flight = Arc::clone(&in_flight);
            let token = token.clone();
            let job_fn = job_fn.clone();
            let label = label.clone();

            Box::pin(async move {
                let Some(_run) = guard.try_acquire() else {
                    debug!(job = %label, "Previous tick still running, skipping");
                    return;
                };
                let _tick = TickGuard::enter(&in_flight);
                let started = Instant::now();
                job_fn(token).await;
                debug!(job = %label, elapsed_ms = started.elapsed().as_millis(), "Tick finished");
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.cron.add(job).await?;
        info!(job = %name, %uuid, cron = %cron_expr, timezone = %tz.name(), ?policy, "Job registered");
        Ok(uuid)
    }

    pub fn parse_timezone(name: &str) -> Result<Tz, SchedulerError> {
        name.parse()
            .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quick() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_stop_cancel_token() {
        let mut service = SchedulerService::new(quick()).await.unwrap();
        assert!(!service.is_running());

        service.start().await.unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start().await, Err(SchedulerError::AlreadyRunning)));

        let token = service.shutdown_token();
        service.shutdown().await.unwrap();
        assert!(!service.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(service.shutdown().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_default_timezone() {
        let config = SchedulerConfig {
            default_timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SchedulerService::new(config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_cron_validation() {
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("0 30 4 * * *").is_ok());
        assert!(validate_cron_expression("invalid").is_err());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[test]
    fn test_named_timezones() {
        assert!(SchedulerService::parse_timezone("UTC").is_ok());
        assert!(SchedulerService::parse_timezone("Europe/Berlin").is_ok());
        assert!(matches!(
            SchedulerService::parse_timezone("Nowhere/Special"),
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_rejects_bad_input() {
        let service = SchedulerService::new(SchedulerConfig::default()).await.unwrap();

        let bad_cron = service
            .register_job("bad-cron", "not-cron", None, OverlapPolicy::Skip, |_token| async {})
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = service
            .register_job("bad-tz", "0 * * * * *", Some("Nowhere/Special"), OverlapPolicy::Skip, |_token| async {})
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registered_job_ticks() {
        let mut service = SchedulerService::new(quick()).await.unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let uuid = service
            .register_job("counter", "* * * * * *", Some("UTC"), OverlapPolicy::Skip, move |_token| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();
        assert!(!uuid.is_nil());

        service.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        service.shutdown().await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 1);
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_waits_for_running_tick() {
        let mut service = SchedulerService::new(SchedulerConfig {
            shutdown_timeout_secs: 5,
            ..Default::default()
        })
        .await
        .unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        service
            .register_job("slow", "* * * * * *", None, OverlapPolicy::Skip, move |token| {
                let flag = Arc::clone(&flag);
                async move {
                    token.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        service.start().await.unwrap();
        let started = Instant::now();
        while service.in_flight() == 0 && started.elapsed() < Duration::from_secs(3) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        service.shutdown().await.unwrap();

        assert!(finished.load(Ordering::SeqCst));
    }
}
