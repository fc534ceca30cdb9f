//! Database operations for `forum_profiles`.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use venue_core::PageStatus;

use crate::DbError;

const PROFILE_COLUMNS: &str = "id, user_profile_id, forum_site_id, forum_user_id, profile_url, \
     forum_username, forum_rank_id, signature_id, verification_code, active, verified, \
     date_verified, signature_found, last_scrape, last_page_status, dummy, created_at, updated_at";

/// A user's claim on an account of an external forum.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ForumProfileRow {
    pub id: i64,
    pub user_profile_id: i64,
    pub forum_site_id: i64,
    pub forum_user_id: String,
    pub profile_url: String,
    pub forum_username: Option<String>,
    pub forum_rank_id: Option<i64>,
    pub signature_id: Option<i64>,
    pub verification_code: Option<String>,
    pub active: bool,
    pub verified: bool,
    pub date_verified: Option<DateTime<Utc>>,
    pub signature_found: bool,
    pub last_scrape: Option<DateTime<Utc>>,
    /// The two most recent page statuses, oldest first.
    pub last_page_status: Json<Vec<PageStatus>>,
    pub dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewForumProfile<'a> {
    pub user_profile_id: i64,
    pub forum_site_id: i64,
    pub forum_user_id: &'a str,
    pub profile_url: &'a str,
    pub forum_username: Option<&'a str>,
    pub forum_rank_id: Option<i64>,
    pub signature_id: Option<i64>,
    pub dummy: bool,
}

/// Insert an unverified, inactive profile. The verification code is assigned
/// separately once the row id is known.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_forum_profile(
    pool: &PgPool,
    new: &NewForumProfile<'_>,
) -> Result<ForumProfileRow, DbError> {
    let sql = format!(
        "INSERT INTO forum_profiles \
             (user_profile_id, forum_site_id, forum_user_id, profile_url, forum_username, \
              forum_rank_id, signature_id, dummy) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {PROFILE_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ForumProfileRow>(&sql)
        .bind(new.user_profile_id)
        .bind(new.forum_site_id)
        .bind(new.forum_user_id)
        .bind(new.profile_url)
        .bind(new.forum_username)
        .bind(new.forum_rank_id)
        .bind(new.signature_id)
        .bind(new.dummy)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no profile has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_forum_profile(pool: &PgPool, id: i64) -> Result<ForumProfileRow, DbError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM forum_profiles WHERE id = $1");
    sqlx::query_as::<_, ForumProfileRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// The verified claim on a forum account, if any user holds one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_verified_profile_by_forum_user(
    pool: &PgPool,
    forum_site_id: i64,
    forum_user_id: &str,
) -> Result<Option<ForumProfileRow>, DbError> {
    let sql = format!(
        "SELECT {PROFILE_COLUMNS} FROM forum_profiles \
         WHERE forum_site_id = $1 AND forum_user_id = $2 AND verified"
    );
    let row = sqlx::query_as::<_, ForumProfileRow>(&sql)
        .bind(forum_site_id)
        .bind(forum_user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// The most recently created profile claiming a forum account, verified or
/// not.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_latest_profile_by_forum_user(
    pool: &PgPool,
    forum_site_id: i64,
    forum_user_id: &str,
) -> Result<Option<ForumProfileRow>, DbError> {
    let sql = format!(
        "SELECT {PROFILE_COLUMNS} FROM forum_profiles \
         WHERE forum_site_id = $1 AND forum_user_id = $2 \
         ORDER BY created_at DESC, id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, ForumProfileRow>(&sql)
        .bind(forum_site_id)
        .bind(forum_user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the profile does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_verification_code(pool: &PgPool, id: i64, code: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE forum_profiles SET verification_code = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(code)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Ids of the profiles a data update batch scrapes: either the single
/// requested profile, or every active, verified profile of an active user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profile_ids_for_update(
    pool: &PgPool,
    only: Option<i64>,
) -> Result<Vec<i64>, DbError> {
    let ids = match only {
        Some(id) => {
            sqlx::query_scalar::<_, i64>("SELECT id FROM forum_profiles WHERE id = $1")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT fp.id FROM forum_profiles fp \
                 JOIN user_profiles u ON u.id = fp.user_profile_id \
                 WHERE u.is_active AND fp.active AND fp.verified \
                 ORDER BY fp.id",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(ids)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_active_profiles(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM forum_profiles WHERE active")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_page_status(
    pool: &PgPool,
    id: i64,
    history: &[PageStatus],
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE forum_profiles SET last_page_status = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(Json(history))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_forum_rank(pool: &PgPool, id: i64, forum_rank_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE forum_profiles SET forum_rank_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(forum_rank_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the outcome of a completed scrape.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_profile_scraped(
    pool: &PgPool,
    id: i64,
    signature_found: bool,
    scraped_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE forum_profiles \
         SET signature_found = $1, last_scrape = $2, updated_at = NOW() \
         WHERE id = $3",
    )
    .bind(signature_found)
    .bind(scraped_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a profile verified and active with the signature it was verified
/// against.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the profile does not exist, or
/// [`DbError::Sqlx`] if the update fails, including when another profile
/// already holds the verified claim on the same forum account.
pub async fn mark_profile_verified(
    pool: &PgPool,
    id: i64,
    forum_username: Option<&str>,
    signature_id: i64,
    verified_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE forum_profiles \
         SET verified = TRUE, active = TRUE, signature_found = TRUE, \
             forum_username = COALESCE($1, forum_username), \
             signature_id = $2, date_verified = $3, updated_at = NOW() \
         WHERE id = $4",
    )
    .bind(forum_username)
    .bind(signature_id)
    .bind(verified_at)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
