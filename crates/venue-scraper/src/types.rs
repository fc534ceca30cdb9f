//! Values produced by the forum adapters.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Everything read from one forum profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePage {
    /// HTTP status the page was served with.
    pub status_code: u16,
    pub username: Option<String>,
    /// Forum rank as displayed on the page, e.g. `Full Member`.
    pub position: Option<String>,
    pub total_posts: Option<u64>,
    /// `None` when the page has no signature block at all.
    pub signature: Option<SignatureBlock>,
}

/// Links found in a signature block.
///
/// Anchor `href`s when the block has any, otherwise its non-empty text lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureBlock {
    pub links: Vec<String>,
}

/// One post authored by the profile owner, as listed by the forum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedPost {
    pub topic_id: String,
    pub message_id: String,
    /// Characters of the author's own text, quotes excluded.
    pub content_length: usize,
    pub posted_at: DateTime<Utc>,
}

/// The posts a listing walk returned and whether it reached the start of
/// the requested window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostListing {
    pub posts: Vec<ScrapedPost>,
    /// `false` when the walk hit the page cap before reaching `since`.
    pub complete: bool,
}

impl PostListing {
    /// Start of the span this listing covers in full, or `None` if it covers
    /// nothing.
    ///
    /// A complete walk covers everything from `since`. A capped walk only
    /// covers what lies after its oldest post; posts sharing that timestamp
    /// may continue on the next, unfetched page.
    #[must_use]
    pub fn covered_since(&self, since: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.complete {
            return Some(since);
        }
        self.posts
            .iter()
            .map(|post| post.posted_at)
            .min()
            .map(|oldest| (oldest + Duration::seconds(1)).max(since))
    }
}
