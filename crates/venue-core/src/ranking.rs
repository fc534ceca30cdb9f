//! Leaderboard ordering and token allocation.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::points::round_points;

/// A user's credited points going into a ranking recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPoints {
    pub user_id: i64,
    pub total_points: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUser {
    pub user_id: i64,
    pub rank: i32,
    pub total_points: Decimal,
    pub tokens: Decimal,
}

/// Order users by points descending and assign 1-based sequential ranks.
///
/// Ties keep ascending user id order regardless of input order, so a re-run
/// over unchanged inputs produces the same ranks.
#[must_use]
pub fn assign_ranks(mut users: Vec<UserPoints>, tokens_available: Decimal) -> Vec<RankedUser> {
    users.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(a.user_id.cmp(&b.user_id))
    });

    let global_points: Decimal = users.iter().map(|u| u.total_points).sum();

    users
        .into_iter()
        .zip(1..)
        .map(|(user, rank)| RankedUser {
            user_id: user.user_id,
            rank,
            tokens: token_allocation(user.total_points, global_points, tokens_available),
            total_points: user.total_points,
        })
        .collect()
}

/// `points / global_points × tokens_available`, or zero when nobody has
/// points yet.
#[must_use]
pub fn token_allocation(
    user_points: Decimal,
    global_points: Decimal,
    tokens_available: Decimal,
) -> Decimal {
    if global_points.is_zero() {
        return Decimal::ZERO;
    }
    round_points(user_points / global_points * tokens_available)
}
