//! Leaderboard recomputation and the event channel that triggers it.
//!
//! Write paths that change a user's standing (a profile gets verified, posts
//! get credited) send a [`RankingEvent`]. A single worker drains the channel
//! and folds any burst of queued events into one recomputation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use venue_core::{assign_ranks, RankedUser};

use crate::error::TaskError;

/// Why a recomputation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingEvent {
    ProfileVerified { forum_profile_id: i64 },
    PostsCredited { count: u64 },
    Requested,
}

/// Result of one recomputation.
#[derive(Debug, Clone, Serialize)]
pub struct RankingOutcome {
    pub batch: i64,
    pub ranked: Vec<RankedUser>,
    pub global_points: Decimal,
    /// `true` when the global total differs from the previous batch's.
    pub global_changed: bool,
}

/// Sending half of the ranking channel.
#[derive(Debug, Clone)]
pub struct RankingSender {
    tx: mpsc::Sender<RankingEvent>,
}

impl RankingSender {
    /// Queue `event` without waiting. A full queue already guarantees a
    /// pending recomputation, so the event is dropped.
    pub fn notify(&self, event: RankingEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(?event, "ranking recomputation already queued");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(?event, "ranking worker has stopped; event dropped");
            }
        }
    }
}

/// Bounded channel between write paths and the ranking worker.
#[must_use]
pub fn ranking_channel(capacity: usize) -> (RankingSender, mpsc::Receiver<RankingEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RankingSender { tx }, rx)
}

/// Recompute every eligible user's rank and append them as a new batch.
///
/// # Errors
///
/// Returns [`TaskError::Db`] if reading points or writing the batch fails.
pub async fn recompute_rankings(
    pool: &PgPool,
    tokens_available: Decimal,
    now: DateTime<Utc>,
) -> Result<RankingOutcome, TaskError> {
    let users = venue_db::list_user_points(pool).await?;
    let ranked = assign_ranks(users, tokens_available);
    let global_points: Decimal = ranked.iter().map(|u| u.total_points).sum();

    let previous = venue_db::latest_ranking_batch(pool).await?;
    let previous_points = match previous {
        Some(batch) => Some(venue_db::batch_total_points(pool, batch).await?),
        None => None,
    };
    let batch = previous.map_or(1, |b| b + 1);

    venue_db::insert_ranking_batch(pool, batch, &ranked, now).await?;

    let global_changed = global_total_changed(previous_points, global_points);
    tracing::info!(
        batch,
        users = ranked.len(),
        global_points = %global_points,
        global_changed,
        "rankings recomputed"
    );

    Ok(RankingOutcome {
        batch,
        ranked,
        global_points,
        global_changed,
    })
}

fn global_total_changed(previous: Option<Decimal>, current: Decimal) -> bool {
    previous.is_none_or(|p| p != current)
}

/// Consume ranking events until every sender is dropped.
///
/// Events that piled up while a recomputation ran are drained and served by
/// the next one. A failed recomputation is logged and the worker carries on.
pub async fn run_ranking_worker(
    pool: PgPool,
    tokens_available: Decimal,
    mut rx: mpsc::Receiver<RankingEvent>,
) {
    while let Some(event) = rx.recv().await {
        let coalesced = drain_pending(&mut rx);
        tracing::debug!(?event, coalesced, "ranking recomputation requested");

        match recompute_rankings(&pool, tokens_available, Utc::now()).await {
            Ok(outcome) if outcome.global_changed => {
                tracing::info!(
                    batch = outcome.batch,
                    global_points = %outcome.global_points,
                    "global points changed; leaderboard refresh"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "ranking recomputation failed"),
        }
    }
    tracing::info!("ranking worker stopped");
}

fn drain_pending(rx: &mut mpsc::Receiver<RankingEvent>) -> usize {
    let mut drained = 0;
    while rx.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_batch_always_counts_as_changed() {
        assert!(global_total_changed(None, Decimal::ZERO));
        assert!(global_total_changed(Some(Decimal::from(10)), Decimal::from(12)));
        assert!(!global_total_changed(Some(Decimal::from(12)), Decimal::from(12)));
    }

    #[tokio::test]
    async fn bursts_are_coalesced() {
        let (tx, mut rx) = ranking_channel(8);
        tx.notify(RankingEvent::Requested);
        tx.notify(RankingEvent::PostsCredited { count: 3 });
        tx.notify(RankingEvent::ProfileVerified { forum_profile_id: 9 });

        assert_eq!(rx.recv().await, Some(RankingEvent::Requested));
        assert_eq!(drain_pending(&mut rx), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_extra_events() {
        let (tx, mut rx) = ranking_channel(1);
        tx.notify(RankingEvent::Requested);
        tx.notify(RankingEvent::Requested);
        assert_eq!(rx.recv().await, Some(RankingEvent::Requested));
        assert_eq!(drain_pending(&mut rx), 0);
    }

    #[tokio::test]
    async fn notify_after_worker_stopped_does_not_panic() {
        let (tx, rx) = ranking_channel(1);
        drop(rx);
        tx.notify(RankingEvent::Requested);
    }
}
