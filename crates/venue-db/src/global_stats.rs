use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// Site-wide totals captured once per data update batch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GlobalStatsRow {
    pub id: i64,
    pub total_posts: i64,
    pub credited_posts: i64,
    pub total_points: Decimal,
    pub active_profiles: i64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate the current post and profile tables into a new snapshot row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_global_stats_snapshot(pool: &PgPool) -> Result<GlobalStatsRow, DbError> {
    let row = sqlx::query_as::<_, GlobalStatsRow>(
        "INSERT INTO global_stats (total_posts, credited_posts, total_points, active_profiles) \
         SELECT \
             (SELECT COUNT(*) FROM forum_posts), \
             (SELECT COUNT(*) FROM forum_posts WHERE credited), \
             (SELECT COALESCE(SUM(total_points), 0) FROM forum_posts WHERE credited), \
             (SELECT COUNT(*) FROM forum_profiles WHERE active) \
         RETURNING id, total_posts, credited_posts, total_points, active_profiles, created_at",
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_global_stats(pool: &PgPool) -> Result<Option<GlobalStatsRow>, DbError> {
    let row = sqlx::query_as::<_, GlobalStatsRow>(
        "SELECT id, total_posts, credited_posts, total_points, active_profiles, created_at \
         FROM global_stats ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
