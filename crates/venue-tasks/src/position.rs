//! Looking up a forum account before a user registers it.

use serde::Serialize;
use venue_scraper::{ForumScraper, ScraperError};

use crate::context::TaskContext;
use crate::error::TaskError;

/// What the forum and the database know about a forum account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileCheck {
    pub found: bool,
    pub status_code: Option<u16>,
    pub forum_user_id: String,
    pub forum_username: Option<String>,
    pub position: Option<String>,
    /// The position maps to a rank that may take part in the campaign.
    pub position_allowed: bool,
    pub existing: Option<ExistingProfile>,
}

/// A forum profile already registered for the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingProfile {
    pub forum_profile_id: i64,
    /// Registered by the user asking.
    pub own: bool,
    /// Own profile with at least one recorded post.
    pub active: bool,
    pub verified: bool,
    pub with_signature: bool,
}

/// Fetch the account behind `profile_url` and report its position and any
/// existing registration. A missing forum account is reported with
/// `found = false`, not as an error.
///
/// # Errors
///
/// Returns [`TaskError::Scraper`] if the URL carries no user id or the page
/// cannot be fetched, or [`TaskError::Db`] on database failures.
pub async fn check_profile(
    ctx: &TaskContext,
    forum_site_id: i64,
    profile_url: &str,
    user_profile_id: i64,
) -> Result<ProfileCheck, TaskError> {
    let site = venue_db::get_forum_site(&ctx.pool, forum_site_id).await?;
    let scraper = ForumScraper::new(site.scraper()?, &site.address)?;
    let forum_user_id = scraper.extract_user_id(profile_url)?;

    let page = match scraper.fetch_profile(&ctx.client, &forum_user_id).await {
        Ok(page) => page,
        Err(ScraperError::ProfileNotFound { .. }) => {
            tracing::info!(forum_site_id, %forum_user_id, "forum account not found");
            return Ok(ProfileCheck {
                forum_user_id,
                ..ProfileCheck::default()
            });
        }
        Err(e) => return Err(e.into()),
    };

    let position_allowed = match page.position.as_deref() {
        Some(position) => venue_db::find_rank_by_name(&ctx.pool, site.id, position)
            .await?
            .is_some_and(|rank| rank.allowed),
        None => false,
    };

    let existing =
        match venue_db::find_latest_profile_by_forum_user(&ctx.pool, site.id, &forum_user_id)
            .await?
        {
            Some(profile) => {
                let own = profile.user_profile_id == user_profile_id;
                let active =
                    own && venue_db::count_posts_for_profile(&ctx.pool, profile.id).await? > 0;
                Some(ExistingProfile {
                    forum_profile_id: profile.id,
                    own,
                    active,
                    verified: profile.verified,
                    with_signature: profile.verified && profile.signature_id.is_some(),
                })
            }
            None => None,
        };

    Ok(ProfileCheck {
        found: true,
        status_code: Some(page.status_code),
        forum_user_id,
        forum_username: page.username,
        position: page.position,
        position_allowed,
        existing,
    })
}
