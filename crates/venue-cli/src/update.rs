//! Batch and leaderboard commands.

use chrono::Utc;
use venue_core::AppConfig;
use venue_tasks::{recompute_rankings, run_data_update, TaskContext};

/// Run one data update batch in the foreground and print its summary.
///
/// # Errors
///
/// Returns an error if a stage of the batch fails. Individual profile
/// failures only show up in the summary.
pub(crate) async fn run_update(ctx: &TaskContext, profile_id: Option<i64>) -> anyhow::Result<()> {
    let report = run_data_update(ctx, profile_id).await?;

    println!(
        "batch {} {}: {} profile(s), {} failed, {} new post(s)",
        report.task_id,
        if report.success { "succeeded" } else { "finished with errors" },
        report.profiles_total,
        report.profiles_failed,
        report.posts_created
    );
    println!(
        "points: {} examined, {} credited, {} dropped",
        report.points.examined, report.points.credited, report.points.dropped
    );
    if let Some(ranking) = &report.ranking {
        println!(
            "ranking batch {}: {} user(s), {} points",
            ranking.batch,
            ranking.ranked.len(),
            ranking.global_points
        );
    }
    if !report.success {
        let errors = venue_db::list_open_scraping_errors(&ctx.pool, Some(report.task_id)).await?;
        for error in &errors {
            println!(
                "  profile {:<8}{:<20}{}",
                error.forum_profile_id, error.error_kind, error.message
            );
        }
    }
    Ok(())
}

/// Recompute rankings and print the top `limit` users.
///
/// # Errors
///
/// Returns an error if the database queries fail.
pub(crate) async fn run_rank(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    limit: usize,
) -> anyhow::Result<()> {
    let outcome = recompute_rankings(pool, config.tokens_available, Utc::now()).await?;

    if outcome.ranked.is_empty() {
        println!("no eligible users; verify a forum profile first");
        return Ok(());
    }

    println!(
        "ranking batch {} ({} points in total)",
        outcome.batch, outcome.global_points
    );
    println!("{:<6}{:<10}{:<14}TOKENS", "RANK", "USER", "POINTS");
    for user in outcome.ranked.iter().take(limit) {
        println!(
            "{:<6}{:<10}{:<14}{}",
            user.rank, user.user_id, user.total_points, user.tokens
        );
    }
    Ok(())
}

/// Print the most recent data update batches.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_tasks(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let tasks = venue_db::list_data_update_tasks(pool, limit.clamp(1, 200)).await?;

    if tasks.is_empty() {
        println!("no data update batches yet; run `update` first");
        return Ok(());
    }

    println!(
        "{:<8}{:<20}{:<10}{:<10}{:<8}STARTED",
        "ID", "STAGE", "SUCCESS", "PROFILES", "FAILED"
    );
    for task in &tasks {
        let success = task.success.map_or("-", |s| if s { "yes" } else { "no" });
        let started = task.started_at.map_or_else(
            || "-".to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        println!(
            "{:<8}{:<20}{:<10}{:<10}{:<8}{}",
            task.id, task.stage, success, task.profiles_total, task.profiles_failed, started
        );
    }
    Ok(())
}
