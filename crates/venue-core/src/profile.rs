use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Number of page statuses kept on a forum profile.
pub const PAGE_STATUS_HISTORY: usize = 2;

/// What one scrape of a profile page observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStatus {
    pub status_code: u16,
    pub page_ok: bool,
    pub signature_found: bool,
}

/// Append `latest` to a profile's status history, keeping only the most
/// recent [`PAGE_STATUS_HISTORY`] entries.
#[must_use]
pub fn push_page_status(history: &[PageStatus], latest: PageStatus) -> Vec<PageStatus> {
    let keep = history.len().saturating_sub(PAGE_STATUS_HISTORY - 1);
    let mut next = history[keep..].to_vec();
    next.push(latest);
    next
}

/// Forum user ids are stored as text but verification codes encode them as
/// integers.
///
/// # Errors
///
/// Returns [`CoreError::InvalidForumUserId`] when the id is not a
/// non-negative integer.
pub fn parse_forum_user_id(raw: &str) -> Result<u64, CoreError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CoreError::InvalidForumUserId(raw.to_string()))
}
