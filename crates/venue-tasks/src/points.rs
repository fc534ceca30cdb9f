//! The points calculation stage: decide crediting for monitored posts.

use serde::Serialize;
use venue_core::PointsPolicy;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::ranking::RankingEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PointsSummary {
    pub examined: u64,
    /// Posts that became credited in this run.
    pub credited: u64,
    /// Posts dropped for too much signature downtime.
    pub dropped: u64,
}

/// Apply the uptime threshold and crediting rules to every monitored post
/// of active users' active profiles.
///
/// # Errors
///
/// Returns [`TaskError::Db`] if reading or updating posts fails.
pub async fn compute_points(ctx: &TaskContext) -> Result<PointsSummary, TaskError> {
    let policy: PointsPolicy = ctx.points_policy();
    let mut summary = PointsSummary::default();

    for post in venue_db::list_settleable_posts(&ctx.pool).await? {
        summary.examined += 1;
        let settlement = policy.settle(post.matured, post.invalid_sig_minutes);
        if settlement.credited == post.credited && settlement.monitoring == post.monitoring {
            continue;
        }

        venue_db::settle_post(
            &ctx.pool,
            post.id,
            settlement.credited,
            settlement.monitoring,
        )
        .await?;

        if settlement.credited && !post.credited {
            summary.credited += 1;
        }
        if !settlement.monitoring {
            summary.dropped += 1;
            tracing::info!(
                post_id = post.id,
                forum_profile_id = post.forum_profile_id,
                downtime_pct = %policy.downtime_pct(post.invalid_sig_minutes),
                "post dropped for signature downtime"
            );
        }
    }

    if summary.credited > 0 {
        ctx.notify_ranking(RankingEvent::PostsCredited {
            count: summary.credited,
        });
    }

    tracing::info!(
        examined = summary.examined,
        credited = summary.credited,
        dropped = summary.dropped,
        "points calculated"
    );
    Ok(summary)
}
