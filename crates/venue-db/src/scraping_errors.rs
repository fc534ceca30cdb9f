use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A failed scrape of one forum profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapingErrorRow {
    pub id: i64,
    pub forum_profile_id: i64,
    pub data_update_task_id: Option<i64>,
    pub error_kind: String,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_scraping_error(
    pool: &PgPool,
    forum_profile_id: i64,
    data_update_task_id: Option<i64>,
    error_kind: &str,
    message: &str,
) -> Result<ScrapingErrorRow, DbError> {
    let row = sqlx::query_as::<_, ScrapingErrorRow>(
        "INSERT INTO scraping_errors (forum_profile_id, data_update_task_id, error_kind, message) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, forum_profile_id, data_update_task_id, error_kind, message, \
                   resolved, created_at, resolved_at",
    )
    .bind(forum_profile_id)
    .bind(data_update_task_id)
    .bind(error_kind)
    .bind(message)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Resolve every open error of the given profiles. Returns how many were
/// resolved.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn resolve_scraping_errors(
    pool: &PgPool,
    forum_profile_ids: &[i64],
) -> Result<u64, DbError> {
    if forum_profile_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE scraping_errors SET resolved = TRUE, resolved_at = NOW() \
         WHERE NOT resolved AND forum_profile_id = ANY($1)",
    )
    .bind(forum_profile_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Unresolved errors, newest first, optionally limited to one batch.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_open_scraping_errors(
    pool: &PgPool,
    data_update_task_id: Option<i64>,
) -> Result<Vec<ScrapingErrorRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapingErrorRow>(
        "SELECT id, forum_profile_id, data_update_task_id, error_kind, message, \
                resolved, created_at, resolved_at \
         FROM scraping_errors \
         WHERE NOT resolved AND ($1::BIGINT IS NULL OR data_update_task_id = $1) \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(data_update_task_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
