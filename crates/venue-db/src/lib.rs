use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use venue_core::{AppConfig, TaskStage};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/venue-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("data update task {id} cannot move from {from} to {to}")]
    InvalidTaskTransition {
        id: i64,
        from: TaskStage,
        to: TaskStage,
    },
    #[error("unknown forum rank '{rank}' on forum site {forum_site_id}")]
    UnknownRank { forum_site_id: i64, rank: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist yet on a fresh database;
    // treat absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}


pub mod data_update_tasks;
pub mod forum_posts;
pub mod forum_profiles;
pub mod forum_sites;
pub mod global_stats;
pub mod rankings;
pub mod scraping_errors;
pub mod seed;
pub mod user_profiles;

pub use data_update_tasks::{
    advance_data_update_task, complete_data_update_task, create_data_update_task,
    fail_data_update_task, get_data_update_task, list_data_update_tasks,
    prune_data_update_tasks, DataUpdateTaskRow, TaskCounters,
};
pub use forum_posts::{
    accrue_signature_minutes, count_posts_for_profile, insert_forum_post, list_posts_for_profile,
    list_settleable_posts, list_unmatured_posts, mark_missing_posts, mark_post_matured,
    settle_post, ForumPostRow, NewForumPost,
};
pub use forum_profiles::{
    count_active_profiles, create_forum_profile, find_latest_profile_by_forum_user,
    find_verified_profile_by_forum_user, get_forum_profile, list_profile_ids_for_update,
    mark_profile_scraped, mark_profile_verified, set_forum_rank, set_page_status,
    set_verification_code, ForumProfileRow, NewForumProfile,
};
pub use forum_sites::{
    find_rank_by_name, get_forum_rank, get_forum_site, get_forum_site_by_name, get_signature,
    list_forum_sites, ForumSiteRow, ForumUserRankRow, SignatureRow,
};
pub use global_stats::{insert_global_stats_snapshot, latest_global_stats, GlobalStatsRow};
pub use rankings::{
    batch_total_points, insert_ranking_batch, latest_ranking_batch, list_ranking_batch,
    list_user_points, RankingRow,
};
pub use scraping_errors::{
    list_open_scraping_errors, record_scraping_error, resolve_scraping_errors, ScrapingErrorRow,
};
pub use seed::seed_forums;
pub use user_profiles::{create_user_profile, get_user_profile, UserProfileRow};
