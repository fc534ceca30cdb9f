//! Verifying that a forum profile displays its assigned signature.

use chrono::Utc;
use serde::Serialize;
use venue_core::{expected_links, parse_forum_user_id};
use venue_db::{ForumProfileRow, SignatureRow};
use venue_scraper::{
    verify_signature, ForumScraper, ProfileIdentity, ProfilePage, SignatureVerification,
};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::ranking::RankingEvent;

/// Result of a verification request, as reported back to the user.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub forum_profile_id: i64,
    pub verified: bool,
    pub links_verified: bool,
    pub code_verified: bool,
    pub forum_username: Option<String>,
    pub reason: Option<String>,
}

/// Check a scraped page against `signature` for `profile`. In test mode
/// every fetched page passes.
///
/// # Errors
///
/// Returns [`TaskError::Core`] if the profile's forum user id is not numeric.
pub(crate) fn check_signature(
    ctx: &TaskContext,
    page: &ProfilePage,
    signature: &SignatureRow,
    profile: &ForumProfileRow,
) -> Result<SignatureVerification, TaskError> {
    if ctx.config.test_mode {
        return Ok(SignatureVerification::test_mode());
    }
    let identity = ProfileIdentity {
        profile_id: profile.id.unsigned_abs(),
        forum_user_id: parse_forum_user_id(&profile.forum_user_id)?,
    };
    Ok(verify_signature(
        page.signature.as_ref(),
        &expected_links(&signature.code),
        &ctx.codec,
        identity,
    ))
}

/// Scrape a profile and verify it against `signature_id`.
///
/// On success the forum username is stored and the profile becomes verified
/// and active with this signature. A mismatch is not an error; the outcome
/// carries the reason.
///
/// # Errors
///
/// Returns [`TaskError::Scraper`] if the profile page cannot be fetched, or
/// [`TaskError::Db`] on database failures.
pub async fn verify_profile_signature(
    ctx: &TaskContext,
    forum_profile_id: i64,
    signature_id: i64,
) -> Result<VerificationOutcome, TaskError> {
    let profile = venue_db::get_forum_profile(&ctx.pool, forum_profile_id).await?;
    let signature = venue_db::get_signature(&ctx.pool, signature_id).await?;
    let rejected = |reason: String| VerificationOutcome {
        forum_profile_id,
        verified: false,
        links_verified: false,
        code_verified: false,
        forum_username: None,
        reason: Some(reason),
    };

    if signature.forum_site_id != profile.forum_site_id {
        return Ok(rejected(format!(
            "signature '{}' belongs to another forum site",
            signature.name
        )));
    }
    if !signature.active {
        return Ok(rejected(format!("signature '{}' is not active", signature.name)));
    }

    let site = venue_db::get_forum_site(&ctx.pool, profile.forum_site_id).await?;
    let scraper = ForumScraper::new(site.scraper()?, &site.address)?;
    let page = scraper
        .fetch_profile(&ctx.client, &profile.forum_user_id)
        .await?;
    let check = check_signature(ctx, &page, &signature, &profile)?;

    let mut outcome = VerificationOutcome {
        forum_profile_id,
        verified: check.verified(),
        links_verified: check.links_verified,
        code_verified: check.code_verified,
        forum_username: page.username.clone(),
        reason: check.reason.clone(),
    };

    if !outcome.verified {
        tracing::info!(
            forum_profile_id,
            reason = outcome.reason.as_deref().unwrap_or_default(),
            "signature verification failed"
        );
        return Ok(outcome);
    }

    if let Some(other) =
        venue_db::find_verified_profile_by_forum_user(&ctx.pool, site.id, &profile.forum_user_id)
            .await?
            .filter(|other| other.id != profile.id)
    {
        tracing::warn!(
            forum_profile_id,
            claimed_by = other.id,
            "forum account already verified by another profile"
        );
        outcome.verified = false;
        outcome.reason = Some("forum account is already verified by another profile".to_string());
        return Ok(outcome);
    }

    venue_db::mark_profile_verified(
        &ctx.pool,
        profile.id,
        page.username.as_deref(),
        signature.id,
        Utc::now(),
    )
    .await?;
    ctx.notify_ranking(RankingEvent::ProfileVerified { forum_profile_id });

    tracing::info!(
        forum_profile_id,
        forum_username = page.username.as_deref().unwrap_or_default(),
        signature = %signature.name,
        "forum profile verified"
    );
    Ok(outcome)
}
