//! Database operations for `forum_posts`.
//!
//! Points columns are written once on insert. Every later update touches
//! only the bookkeeping columns (signature minutes, maturity, crediting).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use venue_core::PostPoints;

use crate::DbError;

const POST_COLUMNS: &str = "id, user_profile_id, forum_profile_id, forum_rank_id, topic_id, \
     message_id, unique_content_length, posted_at, base_points, influence_bonus_pct, \
     influence_bonus_pts, total_points, valid_sig_minutes, invalid_sig_minutes, credited, \
     monitoring, matured, date_matured, last_checked, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ForumPostRow {
    pub id: i64,
    pub user_profile_id: i64,
    pub forum_profile_id: i64,
    pub forum_rank_id: Option<i64>,
    pub topic_id: String,
    pub message_id: String,
    pub unique_content_length: i32,
    pub posted_at: DateTime<Utc>,
    pub base_points: Decimal,
    pub influence_bonus_pct: Decimal,
    pub influence_bonus_pts: Decimal,
    pub total_points: Decimal,
    pub valid_sig_minutes: i64,
    pub invalid_sig_minutes: i64,
    pub credited: bool,
    pub monitoring: bool,
    pub matured: bool,
    pub date_matured: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewForumPost<'a> {
    pub user_profile_id: i64,
    pub forum_profile_id: i64,
    pub forum_rank_id: Option<i64>,
    pub topic_id: &'a str,
    pub message_id: &'a str,
    pub unique_content_length: i32,
    pub posted_at: DateTime<Utc>,
    pub points: PostPoints,
}

/// Insert a newly observed post with its points.
///
/// Returns `None` when the post is already recorded for this profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_forum_post(
    pool: &PgPool,
    new: &NewForumPost<'_>,
) -> Result<Option<ForumPostRow>, DbError> {
    let sql = format!(
        "INSERT INTO forum_posts \
             (user_profile_id, forum_profile_id, forum_rank_id, topic_id, message_id, \
              unique_content_length, posted_at, base_points, influence_bonus_pct, \
              influence_bonus_pts, total_points) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (forum_profile_id, topic_id, message_id) DO NOTHING \
         RETURNING {POST_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ForumPostRow>(&sql)
        .bind(new.user_profile_id)
        .bind(new.forum_profile_id)
        .bind(new.forum_rank_id)
        .bind(new.topic_id)
        .bind(new.message_id)
        .bind(new.unique_content_length)
        .bind(new.posted_at)
        .bind(new.points.base_points)
        .bind(new.points.influence_bonus_pct)
        .bind(new.points.influence_bonus_pts)
        .bind(new.points.total_points)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_for_profile(
    pool: &PgPool,
    forum_profile_id: i64,
) -> Result<Vec<ForumPostRow>, DbError> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM forum_posts \
         WHERE forum_profile_id = $1 ORDER BY posted_at, id"
    );
    let rows = sqlx::query_as::<_, ForumPostRow>(&sql)
        .bind(forum_profile_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unmatured_posts(
    pool: &PgPool,
    forum_profile_id: i64,
) -> Result<Vec<ForumPostRow>, DbError> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM forum_posts \
         WHERE forum_profile_id = $1 AND NOT matured ORDER BY posted_at, id"
    );
    let rows = sqlx::query_as::<_, ForumPostRow>(&sql)
        .bind(forum_profile_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_post_matured(
    pool: &PgPool,
    post_id: i64,
    matured_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE forum_posts SET matured = TRUE, date_matured = $1 \
         WHERE id = $2 AND NOT matured",
    )
    .bind(matured_at)
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_posts_for_profile(pool: &PgPool, forum_profile_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM forum_posts WHERE forum_profile_id = $1",
    )
    .bind(forum_profile_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Add minutes to a tracked post's valid or invalid signature counters.
///
/// Matured posts are left untouched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn accrue_signature_minutes(
    pool: &PgPool,
    post_id: i64,
    valid_minutes: i64,
    invalid_minutes: i64,
    checked_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE forum_posts \
         SET valid_sig_minutes = valid_sig_minutes + $1, \
             invalid_sig_minutes = invalid_sig_minutes + $2, \
             last_checked = $3 \
         WHERE id = $4 AND NOT matured",
    )
    .bind(valid_minutes)
    .bind(invalid_minutes)
    .bind(checked_at)
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stop monitoring unmatured posts posted since `since` that the latest
/// scrape no longer found. Returns the number of posts dropped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_missing_posts(
    pool: &PgPool,
    forum_profile_id: i64,
    since: DateTime<Utc>,
    seen_message_ids: &[String],
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE forum_posts SET credited = FALSE, monitoring = FALSE \
         WHERE forum_profile_id = $1 AND NOT matured AND monitoring \
           AND posted_at >= $2 AND NOT (message_id = ANY($3))",
    )
    .bind(forum_profile_id)
    .bind(since)
    .bind(seen_message_ids)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Monitored posts of active users' active profiles, the input to the
/// points calculation stage.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_settleable_posts(pool: &PgPool) -> Result<Vec<ForumPostRow>, DbError> {
    let columns = POST_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM forum_posts p \
         JOIN forum_profiles fp ON fp.id = p.forum_profile_id \
         JOIN user_profiles u ON u.id = fp.user_profile_id \
         WHERE p.monitoring AND fp.active AND u.is_active \
         ORDER BY p.id"
    );
    let rows = sqlx::query_as::<_, ForumPostRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn settle_post(
    pool: &PgPool,
    post_id: i64,
    credited: bool,
    monitoring: bool,
) -> Result<(), DbError> {
    sqlx::query("UPDATE forum_posts SET credited = $1, monitoring = $2 WHERE id = $3")
        .bind(credited)
        .bind(monitoring)
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}
