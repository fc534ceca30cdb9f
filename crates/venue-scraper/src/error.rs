use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("page not found: {url}")]
    NotFound { url: String },

    #[error("forum profile {forum_user_id} not found")]
    ProfileNotFound { forum_user_id: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to parse {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("invalid profile URL \"{url}\": {reason}")]
    InvalidProfileUrl { url: String, reason: String },

    #[error("invalid forum address \"{address}\": {reason}")]
    InvalidForumAddress { address: String, reason: String },
}

impl ScraperError {
    /// `true` for transient failures that are worth another attempt.
    ///
    /// Transport failures, timeouts and 5xx responses retry, as does HTTP 429.
    /// Everything the forum answered deliberately (404, other 4xx, markup we
    /// cannot read) does not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::RateLimited { .. } => true,
            Self::NotFound { .. }
            | Self::ProfileNotFound { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Parse { .. }
            | Self::InvalidProfileUrl { .. }
            | Self::InvalidForumAddress { .. } => false,
        }
    }

    /// HTTP status the forum answered with, when the failure carries one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::RateLimited { .. } => Some(429),
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => Some(404),
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Parse { .. } | Self::InvalidProfileUrl { .. } | Self::InvalidForumAddress { .. } => {
                None
            }
        }
    }

    /// Short stable label stored with per-profile scraping errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound { .. } => "not_found",
            Self::ProfileNotFound { .. } => "profile_not_found",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::Parse { .. } => "parse",
            Self::InvalidProfileUrl { .. } => "invalid_profile_url",
            Self::InvalidForumAddress { .. } => "invalid_forum_address",
        }
    }
}
