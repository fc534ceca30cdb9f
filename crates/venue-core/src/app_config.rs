use std::net::SocketAddr;
use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::points::PointsPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub forums_path: PathBuf,
    /// Salt for verification codes. Changing it invalidates every code
    /// already pasted into a forum signature.
    pub secret_key: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_concurrent_profiles: usize,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    /// Signatures always count as found while this is on.
    pub test_mode: bool,
    pub post_points: Decimal,
    pub maturation_period_hours: u32,
    pub uptime_percentage_threshold: Decimal,
    pub tokens_available: Decimal,
    pub scrape_interval_secs: u64,
    pub posts_lookback_hours: u32,
    pub task_retention_days: u32,
}

impl AppConfig {
    /// The crediting rules derived from this configuration.
    #[must_use]
    pub fn points_policy(&self) -> PointsPolicy {
        PointsPolicy {
            post_points: self.post_points,
            maturation_period_hours: self.maturation_period_hours,
            uptime_percentage_threshold: self.uptime_percentage_threshold,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("forums_path", &self.forums_path)
            .field("database_url", &"[redacted]")
            .field("secret_key", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field(
                "scraper_max_concurrent_profiles",
                &self.scraper_max_concurrent_profiles,
            )
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("test_mode", &self.test_mode)
            .field("post_points", &self.post_points)
            .field("maturation_period_hours", &self.maturation_period_hours)
            .field(
                "uptime_percentage_threshold",
                &self.uptime_percentage_threshold,
            )
            .field("tokens_available", &self.tokens_available)
            .field("scrape_interval_secs", &self.scrape_interval_secs)
            .field("posts_lookback_hours", &self.posts_lookback_hours)
            .field("task_retention_days", &self.task_retention_days)
            .finish()
    }
}
