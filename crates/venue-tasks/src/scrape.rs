//! The per-profile unit of a data update batch.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use venue_core::{push_page_status, PageStatus, PointsPolicy, SignatureState};
use venue_db::{DbError, ForumProfileRow, ForumUserRankRow, NewForumPost};
use venue_scraper::{ForumScraper, PostListing, ProfilePage, ScrapedPost, ScraperError};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::verify::check_signature;

/// What one profile scrape changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeOutcome {
    /// Dummy profiles are never scraped.
    pub skipped: bool,
    pub signature_found: bool,
    pub posts_created: u32,
    pub posts_matured: u32,
    pub posts_dropped: u64,
}

/// Scrape one forum profile: record the page status, follow rank changes,
/// mature and track existing posts, record new posts with their points, and
/// stop monitoring posts that disappeared.
///
/// # Errors
///
/// Returns [`TaskError::Scraper`] if a page cannot be fetched or read,
/// [`TaskError::MissingSignature`] if the profile has no signature, or
/// [`TaskError::Db`] on database failures including an unknown forum rank.
pub async fn scrape_forum_profile(
    ctx: &TaskContext,
    forum_profile_id: i64,
) -> Result<ScrapeOutcome, TaskError> {
    let profile = venue_db::get_forum_profile(&ctx.pool, forum_profile_id).await?;
    if profile.dummy {
        tracing::debug!(forum_profile_id, "skipping dummy forum profile");
        return Ok(ScrapeOutcome {
            skipped: true,
            ..ScrapeOutcome::default()
        });
    }

    let signature_id = profile
        .signature_id
        .ok_or(TaskError::MissingSignature { forum_profile_id })?;
    let signature = venue_db::get_signature(&ctx.pool, signature_id).await?;
    let site = venue_db::get_forum_site(&ctx.pool, profile.forum_site_id).await?;
    let scraper = ForumScraper::new(site.scraper()?, &site.address)?;

    let page = match scraper
        .fetch_profile(&ctx.client, &profile.forum_user_id)
        .await
    {
        Ok(page) => page,
        Err(e) => {
            record_failed_page(ctx, &profile, &e).await;
            return Err(e.into());
        }
    };
    let signature_found = check_signature(ctx, &page, &signature, &profile)?.verified();

    let history = push_page_status(
        &profile.last_page_status.0,
        PageStatus {
            status_code: page.status_code,
            page_ok: true,
            signature_found,
        },
    );
    venue_db::set_page_status(&ctx.pool, profile.id, &history).await?;

    let rank = current_rank(ctx, &profile, &page).await?;
    let rank_allowed = rank.as_ref().is_some_and(|r| r.allowed);

    let now = Utc::now();
    let policy = ctx.points_policy();
    let posts_matured = track_posts(
        ctx,
        &policy,
        &profile,
        SignatureState::from_observation(signature_found, rank_allowed),
        now,
    )
    .await?;

    let since = scrape_window_start(
        profile.last_scrape.or(profile.date_verified),
        ctx.config.posts_lookback_hours,
        now,
    );
    let listing = scraper
        .fetch_posts_since(&ctx.client, &profile.forum_user_id, since, now)
        .await?;

    let bonus = rank
        .as_ref()
        .map_or(Decimal::ZERO, |r| r.bonus_percentage);
    let posts_created =
        record_posts(ctx, &policy, &profile, rank.as_ref(), bonus, &listing.posts).await?;
    let posts_dropped = drop_missing_posts(ctx, &profile, &listing, since).await?;

    venue_db::mark_profile_scraped(&ctx.pool, profile.id, signature_found, now).await?;

    tracing::info!(
        forum_profile_id,
        signature_found,
        rank = rank.as_ref().map_or("", |r| r.name.as_str()),
        posts_seen = listing.posts.len(),
        posts_created,
        posts_matured,
        posts_dropped,
        "forum profile scraped"
    );

    Ok(ScrapeOutcome {
        skipped: false,
        signature_found,
        posts_created,
        posts_matured,
        posts_dropped,
    })
}

/// Stop monitoring posts that are gone from the listing. Only the span the
/// listing covers in full is checked; older posts past a capped walk are
/// left alone.
async fn drop_missing_posts(
    ctx: &TaskContext,
    profile: &ForumProfileRow,
    listing: &PostListing,
    since: DateTime<Utc>,
) -> Result<u64, TaskError> {
    let Some(from) = listing.covered_since(since) else {
        tracing::warn!(
            forum_profile_id = profile.id,
            "post listing covered nothing, skipping deleted post check"
        );
        return Ok(0);
    };
    if from > since {
        tracing::warn!(
            forum_profile_id = profile.id,
            %since,
            %from,
            "post listing capped, deleted post check narrowed"
        );
    }

    let seen: Vec<String> = listing.posts.iter().map(|p| p.message_id.clone()).collect();
    Ok(venue_db::mark_missing_posts(&ctx.pool, profile.id, from, &seen).await?)
}

/// Record an unreadable profile page in the status history. Failures to do so
/// are logged; the fetch error is what the caller reports.
async fn record_failed_page(ctx: &TaskContext, profile: &ForumProfileRow, error: &ScraperError) {
    let history = push_page_status(&profile.last_page_status.0, failed_page_status(error));
    if let Err(e) = venue_db::set_page_status(&ctx.pool, profile.id, &history).await {
        tracing::warn!(
            forum_profile_id = profile.id,
            error = %e,
            "failed to record page status"
        );
    }
}

fn failed_page_status(error: &ScraperError) -> PageStatus {
    PageStatus {
        status_code: error.status_code().unwrap_or(0),
        page_ok: false,
        signature_found: false,
    }
}

/// The rank the profile holds after this scrape, updating the stored rank
/// when the forum shows a different position.
async fn current_rank(
    ctx: &TaskContext,
    profile: &ForumProfileRow,
    page: &ProfilePage,
) -> Result<Option<ForumUserRankRow>, TaskError> {
    let Some(position) = page.position.as_deref() else {
        return match profile.forum_rank_id {
            Some(id) => Ok(Some(venue_db::get_forum_rank(&ctx.pool, id).await?)),
            None => Ok(None),
        };
    };

    let rank = venue_db::find_rank_by_name(&ctx.pool, profile.forum_site_id, position)
        .await?
        .ok_or_else(|| DbError::UnknownRank {
            forum_site_id: profile.forum_site_id,
            rank: position.to_string(),
        })?;

    if profile.forum_rank_id != Some(rank.id) {
        venue_db::set_forum_rank(&ctx.pool, profile.id, rank.id).await?;
        tracing::info!(
            forum_profile_id = profile.id,
            rank = %rank.name,
            "forum rank changed"
        );
    }
    Ok(Some(rank))
}

/// Mature posts past the maturation period; add the minutes since the last
/// scrape to the valid or invalid counter of the rest. Returns how many
/// posts matured.
async fn track_posts(
    ctx: &TaskContext,
    policy: &PointsPolicy,
    profile: &ForumProfileRow,
    state: SignatureState,
    now: DateTime<Utc>,
) -> Result<u32, TaskError> {
    let elapsed = PointsPolicy::elapsed_minutes(profile.last_scrape, now);
    let (valid, invalid) = match state {
        SignatureState::Valid => (elapsed, 0),
        SignatureState::Invalid => (0, elapsed),
    };

    let mut matured = 0;
    for post in venue_db::list_unmatured_posts(&ctx.pool, profile.id).await? {
        if policy.is_due_to_mature(post.posted_at, now) {
            venue_db::mark_post_matured(&ctx.pool, post.id, now).await?;
            matured += 1;
        } else if elapsed > 0 && post.monitoring {
            venue_db::accrue_signature_minutes(&ctx.pool, post.id, valid, invalid, now).await?;
        }
    }
    Ok(matured)
}

/// Insert posts not recorded yet. Points are fixed here from the rank held
/// at scrape time.
async fn record_posts(
    ctx: &TaskContext,
    policy: &PointsPolicy,
    profile: &ForumProfileRow,
    rank: Option<&ForumUserRankRow>,
    bonus_percentage: Decimal,
    posts: &[ScrapedPost],
) -> Result<u32, TaskError> {
    let points = policy.post_points(bonus_percentage);
    let mut created = 0;

    for post in posts {
        let inserted = venue_db::insert_forum_post(
            &ctx.pool,
            &NewForumPost {
                user_profile_id: profile.user_profile_id,
                forum_profile_id: profile.id,
                forum_rank_id: rank.map(|r| r.id),
                topic_id: &post.topic_id,
                message_id: &post.message_id,
                unique_content_length: i32::try_from(post.content_length).unwrap_or(i32::MAX),
                posted_at: post.posted_at,
                points,
            },
        )
        .await?;
        if inserted.is_some() {
            created += 1;
        }
    }
    Ok(created)
}

/// Posts are re-read from `lookback_hours` before the previous scrape, or
/// before now for a profile never scraped.
fn scrape_window_start(
    last_scrape: Option<DateTime<Utc>>,
    lookback_hours: u32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    last_scrape.unwrap_or(now) - Duration::hours(i64::from(lookback_hours))
}
