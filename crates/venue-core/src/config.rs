use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingEnvVar(var.to_string())),
        }
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_decimal = |var: &str, default: &str| -> Result<Decimal, ConfigError> {
        Decimal::from_str(or_default(var, default).trim()).map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got \"{other}\""))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let secret_key = require("VENUE_SECRET_KEY")?;

    let env = parse_environment(&or_default("VENUE_ENV", "development"))?;

    let bind_addr = parse_addr("VENUE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("VENUE_LOG_LEVEL", "info");
    let forums_path = PathBuf::from(or_default("VENUE_FORUMS_PATH", "./config/forums.yaml"));

    let db_max_connections = parse_u32("VENUE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("VENUE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("VENUE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_u64("VENUE_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default(
        "VENUE_SCRAPER_USER_AGENT",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    );
    let scraper_max_concurrent_profiles =
        parse_usize("VENUE_SCRAPER_MAX_CONCURRENT_PROFILES", "4")?;
    let scraper_max_retries = parse_u32("VENUE_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_ms = parse_u64("VENUE_SCRAPER_RETRY_BACKOFF_BASE_MS", "1000")?;

    let test_mode = parse_bool("VENUE_TEST_MODE", "false")?;
    let post_points = parse_decimal("VENUE_POST_POINTS", "100")?;
    if post_points.is_sign_negative() {
        return Err(invalid("VENUE_POST_POINTS", "must not be negative".to_string()));
    }

    let maturation_period_hours = parse_u32("VENUE_MATURATION_PERIOD_HOURS", "24")?;
    if maturation_period_hours == 0 {
        return Err(invalid(
            "VENUE_MATURATION_PERIOD_HOURS",
            "must be at least 1".to_string(),
        ));
    }

    let uptime_percentage_threshold = parse_decimal("VENUE_UPTIME_PERCENTAGE_THRESHOLD", "90")?;
    if uptime_percentage_threshold < Decimal::ZERO
        || uptime_percentage_threshold > Decimal::ONE_HUNDRED
    {
        return Err(invalid(
            "VENUE_UPTIME_PERCENTAGE_THRESHOLD",
            "must be between 0 and 100".to_string(),
        ));
    }

    let tokens_available = parse_decimal("VENUE_TOKENS_AVAILABLE", "120000")?;
    let scrape_interval_secs = parse_u64("VENUE_SCRAPE_INTERVAL_SECS", "300")?;
    if scrape_interval_secs == 0 {
        return Err(invalid(
            "VENUE_SCRAPE_INTERVAL_SECS",
            "must be at least 1".to_string(),
        ));
    }
    let posts_lookback_hours = parse_u32("VENUE_POSTS_LOOKBACK_HOURS", "24")?;
    let task_retention_days = parse_u32("VENUE_TASK_RETENTION_DAYS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        forums_path,
        secret_key,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_concurrent_profiles,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        test_mode,
        post_points,
        maturation_period_hours,
        uptime_percentage_threshold,
        tokens_available,
        scrape_interval_secs,
        posts_lookback_hours,
        task_retention_days,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "VENUE_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
