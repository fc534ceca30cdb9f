//! Read access to forum sites, their ranks and signature templates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use venue_core::{CoreError, ScraperKind};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ForumSiteRow {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub scraper_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ForumSiteRow {
    /// The adapter that scrapes this site.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownScraper`] if `scraper_name` names no adapter.
    pub fn scraper(&self) -> Result<ScraperKind, CoreError> {
        self.scraper_name.parse()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ForumUserRankRow {
    pub id: i64,
    pub forum_site_id: i64,
    pub name: String,
    pub allowed: bool,
    pub bonus_percentage: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignatureRow {
    pub id: i64,
    pub forum_site_id: i64,
    pub name: String,
    pub code: String,
    pub test_signature: Option<String>,
    pub active: bool,
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no site has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_forum_site(pool: &PgPool, id: i64) -> Result<ForumSiteRow, DbError> {
    sqlx::query_as::<_, ForumSiteRow>(
        "SELECT id, name, address, scraper_name, created_at, updated_at \
         FROM forum_sites WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_forum_site_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<ForumSiteRow>, DbError> {
    let row = sqlx::query_as::<_, ForumSiteRow>(
        "SELECT id, name, address, scraper_name, created_at, updated_at \
         FROM forum_sites WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_forum_sites(pool: &PgPool) -> Result<Vec<ForumSiteRow>, DbError> {
    let rows = sqlx::query_as::<_, ForumSiteRow>(
        "SELECT id, name, address, scraper_name, created_at, updated_at \
         FROM forum_sites ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no rank has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_forum_rank(pool: &PgPool, id: i64) -> Result<ForumUserRankRow, DbError> {
    sqlx::query_as::<_, ForumUserRankRow>(
        "SELECT id, forum_site_id, name, allowed, bonus_percentage \
         FROM forum_user_ranks WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Look up a rank by the position text a forum prints on profile pages.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_rank_by_name(
    pool: &PgPool,
    forum_site_id: i64,
    name: &str,
) -> Result<Option<ForumUserRankRow>, DbError> {
    let row = sqlx::query_as::<_, ForumUserRankRow>(
        "SELECT id, forum_site_id, name, allowed, bonus_percentage \
         FROM forum_user_ranks WHERE forum_site_id = $1 AND name = $2",
    )
    .bind(forum_site_id)
    .bind(name.trim())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no signature has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_signature(pool: &PgPool, id: i64) -> Result<SignatureRow, DbError> {
    sqlx::query_as::<_, SignatureRow>(
        "SELECT id, forum_site_id, name, code, test_signature, active \
         FROM signatures WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
