//! bitcointalk.org (SMF 1.x).
//!
//! Profiles live at `index.php?action=profile;u=<id>` and render as a
//! two-column label/value table; the signature sits in `div.signature`.
//! `;sa=showPosts;start=<n>` lists the member's posts, 20 per page, newest
//! first.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use venue_core::ScraperKind;

use super::{element_text, join, own_text_length, selector, signature_block, ForumAdapter};
use crate::error::ScraperError;
use crate::types::{ProfilePage, ScrapedPost};

static USER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?;&]u=(\d+)").expect("valid user id regex"));
static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"topic=(\d+)\.msg(\d+)").expect("valid message regex"));

static PROFILE_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELLS: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static SIGNATURE: LazyLock<Selector> = LazyLock::new(|| selector("div.signature"));
static POST_HEADERS: LazyLock<Selector> = LazyLock::new(|| selector("tr.titlebg2"));
static POST_BODIES: LazyLock<Selector> = LazyLock::new(|| selector("td.windowbg2 div.post"));
static MESSAGE_LINK: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="topic="]"#));

const MISSING_MEMBER: &str = "The user whose profile you are trying to view does not exist";
const POSTS_PER_PAGE: u32 = 20;

#[derive(Debug, Clone)]
pub struct Bitcointalk {
    base: Url,
}

impl Bitcointalk {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn index_url(&self, forum_user_id: &str, query: &str) -> Result<Url, ScraperError> {
        let mut url = join(&self.base, "index.php", forum_user_id)?;
        url.set_query(Some(query));
        Ok(url)
    }
}

impl ForumAdapter for Bitcointalk {
    fn kind(&self) -> ScraperKind {
        ScraperKind::Bitcointalk
    }

    fn profile_url(&self, forum_user_id: &str) -> Result<Url, ScraperError> {
        self.index_url(forum_user_id, &format!("action=profile;u={forum_user_id}"))
    }

    fn posts_url(&self, forum_user_id: &str, offset: u32) -> Result<Url, ScraperError> {
        self.index_url(
            forum_user_id,
            &format!("action=profile;u={forum_user_id};sa=showPosts;start={offset}"),
        )
    }

    fn posts_per_page(&self) -> u32 {
        POSTS_PER_PAGE
    }

    fn extract_user_id(&self, profile_url: &str) -> Result<String, ScraperError> {
        USER_ID_RE
            .captures(profile_url)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ScraperError::InvalidProfileUrl {
                url: profile_url.to_owned(),
                reason: "no u=<id> parameter".to_string(),
            })
    }

    fn parse_profile(
        &self,
        forum_user_id: &str,
        status: u16,
        html: &str,
    ) -> Result<ProfilePage, ScraperError> {
        let not_found = || ScraperError::ProfileNotFound {
            forum_user_id: forum_user_id.to_owned(),
        };
        if html.contains(MISSING_MEMBER) {
            return Err(not_found());
        }

        let document = Html::parse_document(html);
        let mut username = None;
        let mut position = None;
        let mut total_posts = None;

        for row in document.select(&PROFILE_ROWS) {
            let cells: Vec<ElementRef<'_>> = row.select(&CELLS).collect();
            let [label, value] = cells.as_slice() else {
                continue;
            };
            let value = element_text(*value);
            match element_text(*label).trim_end_matches(':').trim() {
                "Name" if username.is_none() => username = Some(value),
                "Position" if position.is_none() => position = Some(value),
                "Posts" if total_posts.is_none() => {
                    total_posts = value
                        .split_whitespace()
                        .last()
                        .and_then(|n| n.replace(',', "").parse().ok());
                }
                _ => {}
            }
        }

        let username = username.filter(|name| !name.is_empty()).ok_or_else(not_found)?;

        Ok(ProfilePage {
            status_code: status,
            username: Some(username),
            position: position.filter(|p| !p.is_empty()),
            total_posts,
            signature: signature_block(&document, &SIGNATURE),
        })
    }

    fn parse_posts(
        &self,
        html: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScrapedPost>, ScraperError> {
        let document = Html::parse_document(html);
        let headers = document.select(&POST_HEADERS);
        let bodies = document.select(&POST_BODIES);

        headers
            .zip(bodies)
            .map(|(header, body)| -> Result<ScrapedPost, ScraperError> {
                let (topic_id, message_id) = header
                    .select(&MESSAGE_LINK)
                    .filter_map(|a| a.value().attr("href"))
                    .find_map(|href| {
                        MESSAGE_RE
                            .captures(href)
                            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
                    })
                    .ok_or_else(|| ScraperError::Parse {
                        context: "bitcointalk post listing".to_string(),
                        reason: "post header has no message link".to_string(),
                    })?;

                let stamp = header
                    .select(&CELLS)
                    .last()
                    .map(element_text)
                    .unwrap_or_default();
                let posted_at = parse_timestamp(&stamp, now)?;

                Ok(ScrapedPost {
                    topic_id,
                    message_id,
                    content_length: own_text_length(body, |el| {
                        el.value()
                            .classes()
                            .any(|c| c == "quote" || c == "quoteheader")
                    }),
                    posted_at,
                })
            })
            .collect()
    }
}

/// Parse `on: March 01, 2024, 10:00:00 AM` or `on: Today at 10:00:00 AM`.
fn parse_timestamp(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScraperError> {
    let text = raw.trim().trim_start_matches("on:").trim();
    let invalid = |reason: String| ScraperError::Parse {
        context: "bitcointalk post timestamp".to_string(),
        reason: format!("{text:?}: {reason}"),
    };

    if let Some(time) = text.strip_prefix("Today at ") {
        let time = NaiveTime::parse_from_str(time.trim(), "%I:%M:%S %p")
            .map_err(|e| invalid(e.to_string()))?;
        return Ok(now.date_naive().and_time(time).and_utc());
    }

    NaiveDateTime::parse_from_str(text, "%B %d, %Y, %I:%M:%S %p")
        .map(|dt| dt.and_utc())
        .map_err(|e| invalid(e.to_string()))
}
