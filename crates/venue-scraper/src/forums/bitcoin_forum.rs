//! forum.bitcoin.com (phpBB 3).
//!
//! Member pages are public, so no login is attempted. Profiles live at
//! `<slug>-u<id>/`; any slug resolves, the id is what matters. Post
//! listings come from `search.php?author_id=<id>&sr=posts`, 25 per page.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use venue_core::ScraperKind;

use super::{element_text, join, own_text_length, selector, signature_block, ForumAdapter};
use crate::error::ScraperError;
use crate::types::{ProfilePage, ScrapedPost};

static TOPIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&;]t=(\d+)").expect("valid topic regex"));
static POST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&;]p=(\d+)").expect("valid post regex"));

static DETAIL_VALUES: LazyLock<Selector> =
    LazyLock::new(|| selector("div.bg2 div.column2 dl.details dd"));
static RANK_IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("div.bg1 dl.left-box dd"));
static IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("img[title]"));
static PROFILE_DETAILS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.bg1 dl.profile-details"));
static TERMS: LazyLock<Selector> = LazyLock::new(|| selector("dt"));
static DEFINITIONS: LazyLock<Selector> = LazyLock::new(|| selector("dd"));
static SIGNATURE: LazyLock<Selector> = LazyLock::new(|| selector("div.signature"));
static SEARCH_RESULTS: LazyLock<Selector> = LazyLock::new(|| selector("div.search.post"));
static TOPIC_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="viewtopic.php"]"#));
static RESULT_DATE: LazyLock<Selector> = LazyLock::new(|| selector("dd.search-result-date"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| selector("div.content"));

const MISSING_MEMBER: &str = "The requested user does not exist";
const PROFILE_SLUG: &str = "member";
const POSTS_PER_PAGE: u32 = 25;

/// Shown when a member has neither a rank image nor a textual rank.
pub const NO_RANK: &str = "No rank";

/// Ranks the forum hands out, lowest first.
pub const FORUM_POSITIONS: [&str; 9] = [
    "Nickel Bitcoiner",
    "Bronze Bitcoiner",
    "Silver Bitcoiner",
    "Gold Bitcoiner",
    "Platinum Bitcoiner",
    "Junior Mod",
    "Global Moderator",
    "Site Admin",
    "Founder",
];

#[derive(Debug, Clone)]
pub struct BitcoinForum {
    base: Url,
}

impl BitcoinForum {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

impl ForumAdapter for BitcoinForum {
    fn kind(&self) -> ScraperKind {
        ScraperKind::BitcoinForum
    }

    fn profile_url(&self, forum_user_id: &str) -> Result<Url, ScraperError> {
        if forum_user_id.starts_with("http") {
            return Url::parse(forum_user_id).map_err(|e| ScraperError::InvalidProfileUrl {
                url: forum_user_id.to_owned(),
                reason: e.to_string(),
            });
        }
        join(
            &self.base,
            &format!("{PROFILE_SLUG}-u{forum_user_id}/"),
            forum_user_id,
        )
    }

    fn posts_url(&self, forum_user_id: &str, offset: u32) -> Result<Url, ScraperError> {
        let mut url = join(&self.base, "search.php", forum_user_id)?;
        url.query_pairs_mut()
            .append_pair("author_id", forum_user_id)
            .append_pair("sr", "posts")
            .append_pair("start", &offset.to_string());
        Ok(url)
    }

    fn posts_per_page(&self) -> u32 {
        POSTS_PER_PAGE
    }

    /// `https://forum.bitcoin.com/satoshi-u1234/` yields `1234`.
    fn extract_user_id(&self, profile_url: &str) -> Result<String, ScraperError> {
        let last_segment = profile_url
            .trim()
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let id = last_segment.rsplit("-u").next().unwrap_or_default();

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScraperError::InvalidProfileUrl {
                url: profile_url.to_owned(),
                reason: "expected a trailing <name>-u<id> segment".to_string(),
            });
        }
        Ok(id.to_string())
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

        let mut details = Vec::new();
        for list in document.select(&PROFILE_DETAILS) {
            let terms = list.select(&TERMS).map(element_text);
            let values = list.select(&DEFINITIONS).map(element_text);
            details.extend(terms.zip(values));
        }
        let detail = |key: &str| {
            details
                .iter()
                .find(|(term, _)| term.trim_end_matches(':').trim() == key)
                .map(|(_, value)| value.clone())
                .filter(|value| !value.is_empty())
        };

        let username = detail("Username").ok_or_else(not_found)?;

        let position = document
            .select(&RANK_IMAGES)
            .nth(1)
            .and_then(|dd| dd.select(&IMAGE).next())
            .and_then(|img| img.value().attr("title"))
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .or_else(|| detail("Rank"))
            .unwrap_or_else(|| NO_RANK.to_string());

        let total_posts = document
            .select(&DETAIL_VALUES)
            .nth(2)
            .map(element_text)
            .and_then(|text| {
                text.split_whitespace()
                    .next()
                    .and_then(|n| n.replace(',', "").parse().ok())
            });

        Ok(ProfilePage {
            status_code: status,
            username: Some(username),
            position: Some(position),
            total_posts,
            signature: signature_block(&document, &SIGNATURE),
        })
    }

    fn parse_posts(
        &self,
        html: &str,
        _now: DateTime<Utc>,
    ) -> Result<Vec<ScrapedPost>, ScraperError> {
        let document = Html::parse_document(html);
        let parse_error = |reason: String| ScraperError::Parse {
            context: "forum.bitcoin.com search results".to_string(),
            reason,
        };

        document
            .select(&SEARCH_RESULTS)
            .map(|result| -> Result<ScrapedPost, ScraperError> {
                let hrefs: Vec<&str> = result
                    .select(&TOPIC_LINKS)
                    .filter_map(|a| a.value().attr("href"))
                    .collect();
                let capture = |re: &Regex| {
                    hrefs
                        .iter()
                        .find_map(|href| re.captures(href).map(|caps| caps[1].to_string()))
                };
                let topic_id = capture(&*TOPIC_RE)
                    .ok_or_else(|| parse_error("result has no topic link".to_string()))?;
                let message_id = capture(&*POST_RE)
                    .ok_or_else(|| parse_error("result has no post link".to_string()))?;

                let stamp = result
                    .select(&RESULT_DATE)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();
                let posted_at = NaiveDateTime::parse_from_str(&stamp, "%a %b %d, %Y %I:%M %p")
                    .map(|dt| dt.and_utc())
                    .map_err(|e| parse_error(format!("{stamp:?}: {e}")))?;

                let content_length = result
                    .select(&CONTENT)
                    .next()
                    .map_or(0, |content| {
                        own_text_length(content, |el| el.value().name() == "blockquote")
                    });

                Ok(ScrapedPost {
                    topic_id,
                    message_id,
                    content_length,
                    posted_at,
                })
            })
            .collect()
    }
}
