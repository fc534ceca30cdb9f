//! Ranking snapshots. Rows are only ever inserted, one batch at a time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use venue_core::{RankedUser, UserPoints};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingRow {
    pub id: i64,
    pub user_profile_id: i64,
    pub batch: i64,
    pub rank: i32,
    pub total_points: Decimal,
    pub tokens: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Credited points per eligible user, ordered by user id.
///
/// Eligible users have a confirmed email, an active account and at least one
/// active, verified forum profile. Users whose posts are not yet credited
/// appear with zero points.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_user_points(pool: &PgPool) -> Result<Vec<UserPoints>, DbError> {
    let rows: Vec<(i64, Decimal)> = sqlx::query_as(
        "SELECT u.id, \
                COALESCE(SUM(p.total_points) FILTER (WHERE p.credited), 0)::NUMERIC(14,2) \
         FROM user_profiles u \
         JOIN forum_profiles fp \
           ON fp.user_profile_id = u.id AND fp.active AND fp.verified \
         LEFT JOIN forum_posts p ON p.forum_profile_id = fp.id \
         WHERE u.email_confirmed AND u.is_active \
         GROUP BY u.id \
         ORDER BY u.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(user_id, total_points)| UserPoints {
            user_id,
            total_points,
        })
        .collect())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_ranking_batch(pool: &PgPool) -> Result<Option<i64>, DbError> {
    let batch = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(batch) FROM rankings")
        .fetch_one(pool)
        .await?;
    Ok(batch)
}

/// Sum of the points recorded in a ranking batch.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn batch_total_points(pool: &PgPool, batch: i64) -> Result<Decimal, DbError> {
    let total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(total_points), 0)::NUMERIC(14,2) FROM rankings WHERE batch = $1",
    )
    .bind(batch)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// Write one ranking row per user under `batch`, all timestamped `ranked_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the batch is rolled back.
pub async fn insert_ranking_batch(
    pool: &PgPool,
    batch: i64,
    ranked: &[RankedUser],
    ranked_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for user in ranked {
        sqlx::query(
            "INSERT INTO rankings (user_profile_id, batch, rank, total_points, tokens, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.user_id)
        .bind(batch)
        .bind(user.rank)
        .bind(user.total_points)
        .bind(user.tokens)
        .bind(ranked_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ranking_batch(pool: &PgPool, batch: i64) -> Result<Vec<RankingRow>, DbError> {
    let rows = sqlx::query_as::<_, RankingRow>(
        "SELECT id, user_profile_id, batch, rank, total_points, tokens, created_at \
         FROM rankings WHERE batch = $1 ORDER BY rank",
    )
    .bind(batch)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
