//! Per-forum scraping adapters.
//!
//! Each supported forum engine implements [`ForumAdapter`]: URL building and
//! HTML parsing only, no I/O. [`ForumScraper`] pairs an adapter with a
//! [`ForumClient`] to fetch profiles and post listings.

mod bitcoin_forum;
mod bitcointalk;

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use venue_core::ScraperKind;

use crate::client::ForumClient;
use crate::error::ScraperError;
use crate::types::{PostListing, ProfilePage, ScrapedPost, SignatureBlock};

pub use bitcoin_forum::{BitcoinForum, FORUM_POSITIONS, NO_RANK};
pub use bitcointalk::Bitcointalk;

/// Upper bound on post listing pages fetched per profile and scrape.
pub const MAX_POST_PAGES: u32 = 10;

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Site-specific URL layout and page parsing.
pub trait ForumAdapter: Send + Sync {
    fn kind(&self) -> ScraperKind;

    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidProfileUrl`] if no URL can be built.
    fn profile_url(&self, forum_user_id: &str) -> Result<Url, ScraperError>;

    /// Listing of the user's posts, newest first, starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidProfileUrl`] if no URL can be built.
    fn posts_url(&self, forum_user_id: &str, offset: u32) -> Result<Url, ScraperError>;

    /// Number of posts a full listing page holds.
    fn posts_per_page(&self) -> u32;

    /// The forum's user id embedded in a profile URL.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidProfileUrl`] if the URL carries no id.
    fn extract_user_id(&self, profile_url: &str) -> Result<String, ScraperError>;

    /// # Errors
    ///
    /// Returns [`ScraperError::ProfileNotFound`] if the page does not describe
    /// an existing member.
    fn parse_profile(
        &self,
        forum_user_id: &str,
        status: u16,
        html: &str,
    ) -> Result<ProfilePage, ScraperError>;

    /// # Errors
    ///
    /// Returns [`ScraperError::Parse`] if a listed post cannot be read.
    fn parse_posts(&self, html: &str, now: DateTime<Utc>)
        -> Result<Vec<ScrapedPost>, ScraperError>;
}

/// An adapter bound to one forum site.
pub struct ForumScraper {
    adapter: Box<dyn ForumAdapter>,
}

impl std::fmt::Debug for ForumScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForumScraper")
            .field("kind", &self.adapter.kind())
            .finish_non_exhaustive()
    }
}

impl ForumScraper {
    /// Adapter for `kind` rooted at the site's `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidForumAddress`] if `address` is not an
    /// absolute http(s) URL.
    pub fn new(kind: ScraperKind, address: &str) -> Result<Self, ScraperError> {
        let base = parse_base(address)?;
        let adapter: Box<dyn ForumAdapter> = match kind {
            ScraperKind::Bitcointalk => Box::new(Bitcointalk::new(base)),
            ScraperKind::BitcoinForum => Box::new(BitcoinForum::new(base)),
        };
        Ok(Self { adapter })
    }

    #[must_use]
    pub fn kind(&self) -> ScraperKind {
        self.adapter.kind()
    }

    /// # Errors
    ///
    /// See [`ForumAdapter::profile_url`].
    pub fn profile_url(&self, forum_user_id: &str) -> Result<Url, ScraperError> {
        self.adapter.profile_url(forum_user_id)
    }

    /// # Errors
    ///
    /// See [`ForumAdapter::extract_user_id`].
    pub fn extract_user_id(&self, profile_url: &str) -> Result<String, ScraperError> {
        self.adapter.extract_user_id(profile_url)
    }

    /// Fetch and parse a member's profile page.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::ProfileNotFound`] when the forum has no such
    /// member, or any transport error from [`ForumClient::fetch_page`].
    pub async fn fetch_profile(
        &self,
        client: &ForumClient,
        forum_user_id: &str,
    ) -> Result<ProfilePage, ScraperError> {
        let url = self.adapter.profile_url(forum_user_id)?;
        let page = match client.fetch_page(&url).await {
            Ok(page) => page,
            Err(ScraperError::NotFound { .. }) => {
                return Err(ScraperError::ProfileNotFound {
                    forum_user_id: forum_user_id.to_owned(),
                })
            }
            Err(e) => return Err(e),
        };
        self.adapter
            .parse_profile(forum_user_id, page.status, &page.body)
    }

    /// Posts written at or after `since`, walking listing pages newest first
    /// until an older post, a short page, or [`MAX_POST_PAGES`]. A walk
    /// stopped by the page cap is returned with `complete = false`.
    ///
    /// # Errors
    ///
    /// Returns any fetch or parse error; posts gathered before the failure
    /// are discarded.
    pub async fn fetch_posts_since(
        &self,
        client: &ForumClient,
        forum_user_id: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PostListing, ScraperError> {
        let per_page = self.adapter.posts_per_page();
        let mut seen = HashSet::new();
        let mut listing = PostListing::default();

        for page_index in 0..MAX_POST_PAGES {
            let url = self
                .adapter
                .posts_url(forum_user_id, page_index * per_page)?;
            let page = client.fetch_page(&url).await?;
            let listed = self.adapter.parse_posts(&page.body, now)?;
            let listed_count = listed.len();

            let mut reached_older = false;
            for post in listed {
                if post.posted_at < since {
                    reached_older = true;
                    continue;
                }
                if seen.insert((post.topic_id.clone(), post.message_id.clone())) {
                    listing.posts.push(post);
                }
            }

            tracing::debug!(
                forum_user_id,
                page = page_index,
                listed = listed_count,
                kept = listing.posts.len(),
                "scraped post listing page"
            );

            if reached_older || listed_count < per_page as usize {
                listing.complete = true;
                break;
            }
        }

        if !listing.complete {
            tracing::warn!(
                forum_user_id,
                max_pages = MAX_POST_PAGES,
                kept = listing.posts.len(),
                "post listing capped before reaching the scrape window start"
            );
        }
        Ok(listing)
    }
}

fn parse_base(address: &str) -> Result<Url, ScraperError> {
    let invalid = |reason: String| ScraperError::InvalidForumAddress {
        address: address.to_owned(),
        reason,
    };
    let mut url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

pub(crate) fn join(base: &Url, path: &str, forum_user_id: &str) -> Result<Url, ScraperError> {
    base.join(path)
        .map_err(|e| ScraperError::InvalidProfileUrl {
            url: format!("{base}{path}"),
            reason: format!("cannot build URL for forum user {forum_user_id}: {e}"),
        })
}

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Whitespace-collapsed text of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The first `div.signature` block on the page, if any.
pub(crate) fn signature_block(document: &Html, block: &Selector) -> Option<SignatureBlock> {
    let signature = document.select(block).next()?;

    let hrefs: Vec<String> = signature
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect();

    let links = if hrefs.is_empty() {
        signature
            .text()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        hrefs
    };

    Some(SignatureBlock { links })
}

/// Length of the author's own text in a post body, skipping any element
/// for which `is_quote` holds.
pub(crate) fn own_text_length(
    post: ElementRef<'_>,
    is_quote: impl Fn(ElementRef<'_>) -> bool,
) -> usize {
    let post_id = post.id();
    let own: Vec<&str> = post
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node
                .ancestors()
                .take_while(|ancestor| ancestor.id() != post_id)
                .filter_map(ElementRef::wrap)
                .any(&is_quote)
        })
        .map(|(_, text)| &**text)
        .collect();

    own.join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .count()
}
