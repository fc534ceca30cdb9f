//! Background job scheduler.
//!
//! Registers the recurring data update batch. A tick that fires while the
//! previous batch is still running is skipped rather than stacked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use venue_tasks::{run_data_update, TaskContext};

/// Builds and starts the background job scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(ctx: Arc<TaskContext>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_data_update_job(&scheduler, ctx).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_data_update_job(
    scheduler: &JobScheduler,
    ctx: Arc<TaskContext>,
) -> Result<(), JobSchedulerError> {
    let interval = Duration::from_secs(ctx.config.scrape_interval_secs.max(1));
    let guard = Arc::new(BatchGuard::default());

    let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);
        let guard = Arc::clone(&guard);

        Box::pin(async move {
            let Some(_running) = guard.try_start() else {
                tracing::warn!("scheduler: previous data update still running; skipping tick");
                return;
            };
            match run_data_update(&ctx, None).await {
                Ok(report) if !report.success => tracing::warn!(
                    task_id = report.task_id,
                    profiles_failed = report.profiles_failed,
                    "scheduler: data update finished with failed profiles"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "scheduler: data update failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(
        interval_secs = interval.as_secs(),
        "scheduler: data update job registered"
    );
    Ok(())
}

/// At most one batch at a time.
#[derive(Debug, Default)]
struct BatchGuard {
    running: AtomicBool,
}

impl BatchGuard {
    fn try_start(&self) -> Option<RunningBatch<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningBatch { guard: self })
    }
}

struct RunningBatch<'a> {
    guard: &'a BatchGuard,
}

impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::BatchGuard;

    #[test]
    fn second_batch_is_refused_while_first_runs() {
        let guard = BatchGuard::default();
        let first = guard.try_start();
        assert!(first.is_some());
        assert!(guard.try_start().is_none());
    }

    #[test]
    fn guard_is_released_when_batch_ends() {
        let guard = BatchGuard::default();
        drop(guard.try_start());
        assert!(guard.try_start().is_some());
    }
}
