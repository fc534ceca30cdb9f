//! HTTP client for forum pages.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use venue_core::AppConfig;

use crate::error::ScraperError;
use crate::rate_limit::retry_with_backoff;

/// A fetched HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Fetches forum pages with a shared connection pool.
///
/// 429 and transport failures are retried with jittered exponential backoff
/// up to `max_retries` extra attempts; 5xx responses surface as
/// [`ScraperError::Http`] so they retry too.
#[derive(Debug, Clone)]
pub struct ForumClient {
    client: Client,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ForumClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_ms,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the client cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_ms,
        )
    }

    /// GET `url` and return its body.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`] on HTTP 429 once retries are exhausted.
    /// - [`ScraperError::NotFound`] on HTTP 404 (not retried).
    /// - [`ScraperError::Http`] on transport failures or 5xx once retries are
    ///   exhausted.
    /// - [`ScraperError::UnexpectedStatus`] on any other non-2xx status.
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, ScraperError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self
                .client
                .get(url.clone())
                .header(
                    reqwest::header::ACCEPT,
                    "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
                )
                .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                .send()
                .await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(ScraperError::RateLimited {
                    domain: url.host_str().unwrap_or_default().to_owned(),
                    retry_after_secs,
                });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(ScraperError::NotFound {
                    url: url.to_string(),
                });
            }

            if status.is_server_error() {
                response.error_for_status_ref()?;
            }

            if !status.is_success() {
                return Err(ScraperError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let body = response.text().await?;
            Ok(FetchedPage {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            })
        })
        .await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
