//! The data update batch: scrape every profile in parallel, then walk the
//! remaining stages in order, persisting each transition.

use std::future::Future;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::PgPool;
use venue_core::{ScrapeRate, TaskStage};
use venue_db::TaskCounters;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::points::{compute_points, PointsSummary};
use crate::ranking::{recompute_rankings, RankingOutcome};
use crate::scrape::{scrape_forum_profile, ScrapeOutcome};

/// Per-profile results of the scraping stage.
#[derive(Debug, Default)]
pub struct BatchTally {
    pub succeeded: Vec<i64>,
    pub failed: Vec<(i64, TaskError)>,
    pub skipped: usize,
    pub posts_created: u32,
}

impl BatchTally {
    /// A batch is successful only if every profile scraped cleanly.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn counters(&self) -> TaskCounters {
        let to_i32 = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
        TaskCounters {
            profiles_total: to_i32(self.succeeded.len() + self.failed.len()),
            profiles_failed: to_i32(self.failed.len()),
            posts_created: i32::try_from(self.posts_created).unwrap_or(i32::MAX),
        }
    }
}

/// Run `scrape` for every id with at most `max_concurrent` in flight. One
/// profile failing never stops the others.
pub async fn scrape_batch<F, Fut>(ids: &[i64], max_concurrent: usize, scrape: F) -> BatchTally
where
    F: Fn(i64) -> Fut,
    Fut: Future<Output = Result<ScrapeOutcome, TaskError>>,
{
    let results: Vec<(i64, Result<ScrapeOutcome, TaskError>)> = stream::iter(ids.iter().copied())
        .map(|id| {
            let fut = scrape(id);
            async move { (id, fut.await) }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut tally = BatchTally::default();
    for (id, result) in results {
        match result {
            Ok(outcome) => {
                if outcome.skipped {
                    tally.skipped += 1;
                }
                tally.posts_created = tally.posts_created.saturating_add(outcome.posts_created);
                tally.succeeded.push(id);
            }
            Err(e) => {
                tracing::warn!(forum_profile_id = id, error = %e, "forum profile scrape failed");
                tally.failed.push((id, e));
            }
        }
    }
    tally.succeeded.sort_unstable();
    tally.failed.sort_unstable_by_key(|(id, _)| *id);
    tally
}

/// Summary of a finished batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataUpdateReport {
    pub task_id: i64,
    pub success: bool,
    pub profiles_total: i32,
    pub profiles_failed: i32,
    pub posts_created: i32,
    pub points: PointsSummary,
    pub ranking: Option<RankingOutcome>,
    pub errors_resolved: u64,
    pub tasks_pruned: u64,
}

/// Run one data update batch, optionally limited to a single profile.
///
/// Per-profile scrape failures are recorded as scraping errors and flag the
/// batch unsuccessful; later stages still run. A failing stage moves the
/// batch to `FAILED` and returns the error.
///
/// # Errors
///
/// Returns the first stage-level error, e.g. [`TaskError::Db`] when the
/// profiles to scrape cannot be loaded.
pub async fn run_data_update(
    ctx: &TaskContext,
    only_profile: Option<i64>,
) -> Result<DataUpdateReport, TaskError> {
    // The ranking stage recomputes inline; events would only duplicate it.
    let ctx = ctx.without_ranking_events();
    let task = venue_db::create_data_update_task(&ctx.pool, only_profile).await?;
    tracing::info!(task_id = task.id, ?only_profile, "data update started");

    let mut batch = Batch {
        task_id: task.id,
        only_profile,
        tally: BatchTally::default(),
        report: DataUpdateReport {
            task_id: task.id,
            ..DataUpdateReport::default()
        },
    };

    let mut stage = TaskStage::Pending;
    while let Some(next) = stage.next() {
        let result = match venue_db::advance_data_update_task(&ctx.pool, task.id, stage, next).await
        {
            Ok(()) => batch.run_stage(&ctx, next).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!(task_id = task.id, stage = %next, error = %e, "data update stage failed");
            fail_task_best_effort(&ctx.pool, task.id, &e).await;
            return Err(e);
        }
        stage = next;
    }

    tracing::info!(
        task_id = task.id,
        success = batch.report.success,
        profiles_total = batch.report.profiles_total,
        profiles_failed = batch.report.profiles_failed,
        posts_created = batch.report.posts_created,
        "data update finished"
    );
    Ok(batch.report)
}

struct Batch {
    task_id: i64,
    only_profile: Option<i64>,
    tally: BatchTally,
    report: DataUpdateReport,
}

impl Batch {
    async fn run_stage(&mut self, ctx: &TaskContext, stage: TaskStage) -> Result<(), TaskError> {
        tracing::debug!(task_id = self.task_id, %stage, "data update stage");
        match stage {
            TaskStage::Scraping => self.scrape(ctx).await?,
            TaskStage::Aggregating => {
                let stats = venue_db::insert_global_stats_snapshot(&ctx.pool).await?;
                tracing::info!(
                    total_posts = stats.total_posts,
                    credited_posts = stats.credited_posts,
                    total_points = %stats.total_points,
                    "global stats recorded"
                );
            }
            TaskStage::CalculatingPoints => self.report.points = compute_points(ctx).await?,
            TaskStage::Completing => {
                let counters = self.tally.counters();
                self.report.success = self.tally.success();
                self.report.profiles_total = counters.profiles_total;
                self.report.profiles_failed = counters.profiles_failed;
                self.report.posts_created = counters.posts_created;
                venue_db::complete_data_update_task(
                    &ctx.pool,
                    self.task_id,
                    self.report.success,
                    counters,
                )
                .await?;
            }
            TaskStage::Ranking => {
                let outcome =
                    recompute_rankings(&ctx.pool, ctx.config.tokens_available, Utc::now()).await?;
                self.report.ranking = Some(outcome);
            }
            TaskStage::Cleanup => self.cleanup(ctx).await?,
            TaskStage::Pending | TaskStage::Done | TaskStage::Failed => {}
        }
        Ok(())
    }

    async fn scrape(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let ids = venue_db::list_profile_ids_for_update(&ctx.pool, self.only_profile).await?;
        if self.only_profile.is_none() {
            let rate = scraping_rate(&ctx.pool, ctx.config.scrape_interval_secs).await?;
            tracing::info!(profiles = ids.len(), %rate, "scraping forum profiles");
        }

        self.tally = scrape_batch(&ids, ctx.config.scraper_max_concurrent_profiles, |id| {
            scrape_forum_profile(ctx, id)
        })
        .await;

        for (forum_profile_id, err) in &self.tally.failed {
            if let Err(record_err) = venue_db::record_scraping_error(
                &ctx.pool,
                *forum_profile_id,
                Some(self.task_id),
                err.kind(),
                &err.to_string(),
            )
            .await
            {
                tracing::error!(
                    forum_profile_id,
                    error = %record_err,
                    "failed to record scraping error"
                );
            }
        }
        Ok(())
    }

    async fn cleanup(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.report.errors_resolved =
            venue_db::resolve_scraping_errors(&ctx.pool, &self.tally.succeeded).await?;
        let cutoff = Utc::now() - Duration::days(i64::from(ctx.config.task_retention_days));
        self.report.tasks_pruned = venue_db::prune_data_update_tasks(&ctx.pool, cutoff).await?;
        tracing::debug!(
            errors_resolved = self.report.errors_resolved,
            tasks_pruned = self.report.tasks_pruned,
            "cleanup finished"
        );
        Ok(())
    }
}

async fn fail_task_best_effort(pool: &PgPool, task_id: i64, err: &TaskError) {
    if let Err(mark_err) = venue_db::fail_data_update_task(pool, task_id, &err.to_string()).await
    {
        tracing::error!(
            task_id,
            error = %mark_err,
            "failed to mark data update task as failed"
        );
    }
}

/// Scrape rate needed to visit every active profile once per interval.
///
/// # Errors
///
/// Returns [`TaskError::Db`] if the profiles cannot be counted.
pub async fn scraping_rate(pool: &PgPool, interval_secs: u64) -> Result<ScrapeRate, TaskError> {
    let active = venue_db::count_active_profiles(pool).await?;
    Ok(ScrapeRate::for_profiles(
        u64::try_from(active).unwrap_or(0),
        interval_secs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use venue_scraper::ScraperError;

    fn outcome(posts_created: u32) -> ScrapeOutcome {
        ScrapeOutcome {
            posts_created,
            signature_found: true,
            ..ScrapeOutcome::default()
        }
    }

    #[tokio::test]
    async fn one_failed_profile_flags_the_batch_but_keeps_the_rest() {
        let tally = scrape_batch(&[1, 2, 3], 2, |id| async move {
            if id == 2 {
                Err(TaskError::from(ScraperError::ProfileNotFound {
                    forum_user_id: "2".to_string(),
                }))
            } else {
                Ok(outcome(u32::try_from(id).unwrap() * 2))
            }
        })
        .await;

        assert!(!tally.success());
        assert_eq!(tally.succeeded, vec![1, 3]);
        assert_eq!(tally.failed.len(), 1);
        assert_eq!(tally.failed[0].0, 2);
        assert_eq!(tally.posts_created, 8);

        let counters = tally.counters();
        assert_eq!(counters.profiles_total, 3);
        assert_eq!(counters.profiles_failed, 1);
        assert_eq!(counters.posts_created, 8);
    }

    #[tokio::test]
    async fn empty_batch_is_successful() {
        let tally = scrape_batch(&[], 4, |_| async { Ok(outcome(0)) }).await;
        assert!(tally.success());
        assert_eq!(tally.counters(), TaskCounters::default());
    }

    #[tokio::test]
    async fn skipped_profiles_count_as_succeeded() {
        let tally = scrape_batch(&[5], 1, |_| async {
            Ok(ScrapeOutcome {
                skipped: true,
                ..ScrapeOutcome::default()
            })
        })
        .await;
        assert!(tally.success());
        assert_eq!(tally.skipped, 1);
        assert_eq!(tally.succeeded, vec![5]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let ids: Vec<i64> = (1..=8).collect();

        let tally = scrape_batch(&ids, 3, |_| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(outcome(1))
            }
        })
        .await;

        assert_eq!(tally.succeeded.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
