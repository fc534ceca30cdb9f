use thiserror::Error;
use venue_core::CoreError;
use venue_db::DbError;
use venue_scraper::ScraperError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("forum profile {forum_profile_id} has no signature assigned")]
    MissingSignature { forum_profile_id: i64 },

    #[error("forum account {forum_user_id} on site {forum_site_id} is already claimed")]
    ForumAccountClaimed {
        forum_site_id: i64,
        forum_user_id: String,
    },
}

impl TaskError {
    /// Label stored in `scraping_errors.error_kind`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Db(DbError::UnknownRank { .. }) => "unknown_rank",
            Self::Db(_) => "database",
            Self::Scraper(e) => e.kind(),
            Self::Core(_) => "invalid_data",
            Self::MissingSignature { .. } => "missing_signature",
            Self::ForumAccountClaimed { .. } => "forum_account_claimed",
        }
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::Sqlx(e))
    }
}
