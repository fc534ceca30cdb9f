//! Creating forum profiles and handing out their signature text.

use venue_core::{inject_verification_code, parse_forum_user_id};
use venue_db::{ForumProfileRow, NewForumProfile};
use venue_scraper::ForumScraper;

use crate::context::TaskContext;
use crate::error::TaskError;

/// A user's request to register a forum account.
#[derive(Debug, Clone)]
pub struct NewProfileRequest<'a> {
    pub user_profile_id: i64,
    pub forum_site_id: i64,
    pub profile_url: &'a str,
    pub signature_id: Option<i64>,
}

/// Insert a forum profile and assign its verification code.
///
/// The forum user id is taken from `profile_url` with the site's adapter.
///
/// # Errors
///
/// Returns [`TaskError::ForumAccountClaimed`] if another user already holds a
/// verified claim on the account, [`TaskError::Scraper`] if the URL carries
/// no user id, or [`TaskError::Db`] on database failures.
pub async fn create_forum_profile(
    ctx: &TaskContext,
    request: &NewProfileRequest<'_>,
) -> Result<ForumProfileRow, TaskError> {
    let site = venue_db::get_forum_site(&ctx.pool, request.forum_site_id).await?;
    let scraper = ForumScraper::new(site.scraper()?, &site.address)?;
    let forum_user_id = scraper.extract_user_id(request.profile_url)?;
    let numeric_user_id = parse_forum_user_id(&forum_user_id)?;

    if let Some(claimed) =
        venue_db::find_verified_profile_by_forum_user(&ctx.pool, site.id, &forum_user_id).await?
    {
        if claimed.user_profile_id != request.user_profile_id {
            return Err(TaskError::ForumAccountClaimed {
                forum_site_id: site.id,
                forum_user_id,
            });
        }
    }

    let mut row = venue_db::create_forum_profile(
        &ctx.pool,
        &NewForumProfile {
            user_profile_id: request.user_profile_id,
            forum_site_id: site.id,
            forum_user_id: &forum_user_id,
            profile_url: request.profile_url,
            forum_username: None,
            forum_rank_id: None,
            signature_id: request.signature_id,
            dummy: false,
        },
    )
    .await?;

    let code = ctx.codec.encode_profile(row.id.unsigned_abs(), numeric_user_id);
    venue_db::set_verification_code(&ctx.pool, row.id, &code).await?;
    row.verification_code = Some(code);

    tracing::info!(
        forum_profile_id = row.id,
        user_profile_id = row.user_profile_id,
        forum_site = %site.name,
        forum_user_id = %row.forum_user_id,
        "forum profile created"
    );
    Ok(row)
}

/// The verification code of a profile: the stored one, or a fresh encoding
/// of its ids when none was stored yet.
///
/// # Errors
///
/// Returns [`TaskError::Core`] if the stored forum user id is not numeric.
pub fn verification_code_for(
    ctx: &TaskContext,
    profile: &ForumProfileRow,
) -> Result<String, TaskError> {
    if let Some(code) = profile.verification_code.as_deref().filter(|c| !c.is_empty()) {
        return Ok(code.to_string());
    }
    let forum_user_id = parse_forum_user_id(&profile.forum_user_id)?;
    Ok(ctx
        .codec
        .encode_profile(profile.id.unsigned_abs(), forum_user_id))
}

/// The signature text a user pastes into their forum profile for
/// `signature_id`, with the profile's verification code on every link.
///
/// # Errors
///
/// Returns [`TaskError::Db`] if the profile or signature does not exist.
pub async fn signature_code_for(
    ctx: &TaskContext,
    forum_profile_id: i64,
    signature_id: i64,
) -> Result<String, TaskError> {
    let profile = venue_db::get_forum_profile(&ctx.pool, forum_profile_id).await?;
    let signature = venue_db::get_signature(&ctx.pool, signature_id).await?;
    let code = verification_code_for(ctx, &profile)?;
    Ok(inject_verification_code(&signature.code, &code))
}
