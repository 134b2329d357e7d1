//! Cron-driven queue worker.
//!
//! Each tick drains the due jobs of the queue on the blocking pool. Job
//! steps are synchronous calls against the record store and the backend,
//! so they must not run on the async executor.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::overlap::OverlapPolicy;
use crate::queue::JobQueue;
use crate::scheduler::SchedulerService;
use crate::SchedulerError;

pub const QUEUE_WORKER_JOB: &str = "search_queue";

/// Register the queue worker with the scheduler.
///
/// Ticks follow `queue_cron` and claim jobs as `worker_id`, both from the
/// scheduler config. A tick that finds the previous one still draining is
/// skipped, so the same process never runs two passes in parallel.
///
/// Jobs still claimed by `worker_id` from an earlier run are released first.
pub async fn create_queue_worker_job(
    scheduler: &SchedulerService,
    queue: Arc<JobQueue>,
) -> Result<uuid::Uuid, SchedulerError> {
    let cron = scheduler.config().queue_cron.clone();
    let worker_id = scheduler.config().worker_id.clone();
    queue.recover(&worker_id)?;

    scheduler
        .register_job(QUEUE_WORKER_JOB, &cron, None, OverlapPolicy::Skip, move |token| {
            let queue = Arc::clone(&queue);
            let worker_id = worker_id.clone();
            async move {
                if token.is_cancelled() {
                    info!("Queue worker cancelled before tick");
                    return;
                }
                match tokio::task::spawn_blocking(move || queue.run_due_as(&worker_id, Utc::now())).await {
                    Ok(Ok(_summary)) => {}
                    Ok(Err(e)) => error!(error = %e, "Queue tick failed"),
                    Err(e) => error!(error = %e, "Queue tick panicked"),
                }
            }
        })
        .await
}
