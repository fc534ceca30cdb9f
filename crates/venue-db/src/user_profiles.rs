use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A platform user that forum profiles and points belong to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfileRow {
    pub id: i64,
    pub username: String,
    pub email_confirmed: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including when the
/// username is taken.
pub async fn create_user_profile(
    pool: &PgPool,
    username: &str,
    email_confirmed: bool,
) -> Result<UserProfileRow, DbError> {
    let row = sqlx::query_as::<_, UserProfileRow>(
        "INSERT INTO user_profiles (username, email_confirmed) \
         VALUES ($1, $2) \
         RETURNING id, username, email_confirmed, is_active, created_at",
    )
    .bind(username)
    .bind(email_confirmed)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no user has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_user_profile(pool: &PgPool, id: i64) -> Result<UserProfileRow, DbError> {
    sqlx::query_as::<_, UserProfileRow>(
        "SELECT id, username, email_confirmed, is_active, created_at \
         FROM user_profiles WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
