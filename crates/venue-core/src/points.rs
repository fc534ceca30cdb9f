//! Crediting rules for forum posts.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// The tunable constants that decide how posts earn and keep points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsPolicy {
    /// Base points awarded per post.
    pub post_points: Decimal,
    /// Hours after posting at which a post's bookkeeping freezes.
    pub maturation_period_hours: u32,
    /// Minimum share (percent) of the maturation window the signature must
    /// have been displayed for the post to stay creditable.
    pub uptime_percentage_threshold: Decimal,
}

/// Points recorded on a post at creation. Never recomputed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPoints {
    pub base_points: Decimal,
    pub influence_bonus_pct: Decimal,
    pub influence_bonus_pts: Decimal,
    pub total_points: Decimal,
}

impl PostPoints {
    /// `bonus = base × pct / 100`, `total = base + bonus`, each rounded to two
    /// decimal places with banker's rounding.
    #[must_use]
    pub fn compute(base_points: Decimal, bonus_percentage: Decimal) -> Self {
        let base_points = round_points(base_points);
        let influence_bonus_pts =
            round_points(base_points * bonus_percentage / Decimal::ONE_HUNDRED);
        Self {
            base_points,
            influence_bonus_pct: round_points(bonus_percentage),
            influence_bonus_pts,
            total_points: round_points(base_points + influence_bonus_pts),
        }
    }
}

/// Round to the two-decimal precision points are stored at.
#[must_use]
pub fn round_points(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Whether a post's signature counted towards valid or invalid minutes for
/// the interval since the previous scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    Valid,
    Invalid,
}

impl SignatureState {
    /// A signature counts as valid only when it was found and the forum rank
    /// the profile holds is allowed to take part.
    #[must_use]
    pub fn from_observation(signature_found: bool, rank_allowed: bool) -> Self {
        if signature_found && rank_allowed {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

/// Whether a tracked post is still monitored and whether it earns its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub credited: bool,
    pub monitoring: bool,
}

impl PointsPolicy {
    #[must_use]
    pub fn post_points(&self, bonus_percentage: Decimal) -> PostPoints {
        PostPoints::compute(self.post_points, bonus_percentage)
    }

    #[must_use]
    pub fn maturation_period(&self) -> Duration {
        Duration::hours(i64::from(self.maturation_period_hours))
    }

    /// A post matures once it is strictly older than the maturation period.
    #[must_use]
    pub fn is_due_to_mature(&self, posted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - posted_at > self.maturation_period()
    }

    /// Minutes elapsed since `last_scrape` that a tracked post accrues, or 0
    /// when the profile was never scraped or the clock went backwards.
    #[must_use]
    pub fn elapsed_minutes(last_scrape: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
        last_scrape.map_or(0, |last| (now - last).num_minutes().max(0))
    }

    /// Share of the maturation window (percent) the signature was missing.
    #[must_use]
    pub fn downtime_pct(&self, invalid_sig_minutes: i64) -> Decimal {
        let window_minutes = Decimal::from(self.maturation_period_hours) * Decimal::from(60);
        Decimal::from(invalid_sig_minutes) / window_minutes * Decimal::ONE_HUNDRED
    }

    /// `true` once downtime reaches `100 - uptime threshold` percent.
    #[must_use]
    pub fn breaches_uptime(&self, invalid_sig_minutes: i64) -> bool {
        self.downtime_pct(invalid_sig_minutes)
            >= Decimal::ONE_HUNDRED - self.uptime_percentage_threshold
    }

    /// Decide crediting for a monitored post.
    ///
    /// Downtime past the threshold drops the post for good. Otherwise a
    /// matured post is credited; an unmatured one keeps waiting.
    #[must_use]
    pub fn settle(&self, matured: bool, invalid_sig_minutes: i64) -> Settlement {
        if self.breaches_uptime(invalid_sig_minutes) {
            Settlement {
                credited: false,
                monitoring: false,
            }
        } else {
            Settlement {
                credited: matured,
                monitoring: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn policy() -> PointsPolicy {
        PointsPolicy {
            post_points: Decimal::from(100),
            maturation_period_hours: 24,
            uptime_percentage_threshold: Decimal::from(90),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn five_percent_bonus_on_one_hundred() {
        let points = PostPoints::compute(Decimal::from(100), Decimal::from(5));
        assert_eq!(points.base_points, Decimal::new(10000, 2));
        assert_eq!(points.influence_bonus_pts, Decimal::new(500, 2));
        assert_eq!(points.total_points, Decimal::new(10500, 2));
    }

    #[test]
    fn zero_bonus_total_equals_base() {
        let points = PostPoints::compute(Decimal::from(100), Decimal::ZERO);
        assert_eq!(points.influence_bonus_pts, Decimal::ZERO);
        assert_eq!(points.total_points, points.base_points);
    }

    #[test]
    fn bonus_uses_bankers_rounding() {
        // 0.25 * 10% = 0.025, which rounds half-to-even to 0.02
        let points = PostPoints::compute(Decimal::new(25, 2), Decimal::from(10));
        assert_eq!(points.influence_bonus_pts, Decimal::new(2, 2));
        assert_eq!(points.total_points, Decimal::new(27, 2));
    }

    #[test]
    fn total_is_always_base_plus_bonus() {
        for pct in [0, 1, 5, 12, 33, 50, 100] {
            for base in [1, 7, 99, 100, 333] {
                let points = PostPoints::compute(Decimal::from(base), Decimal::from(pct));
                assert_eq!(
                    points.total_points,
                    points.base_points + points.influence_bonus_pts
                );
                assert_eq!(
                    points.influence_bonus_pts,
                    round_points(points.base_points * Decimal::from(pct) / Decimal::ONE_HUNDRED)
                );
            }
        }
    }

    #[test]
    fn policy_applies_configured_base() {
        let points = policy().post_points(Decimal::from(20));
        assert_eq!(points.total_points, Decimal::from(120));
    }

    #[test]
    fn maturity_requires_strictly_more_than_the_period() {
        let policy = policy();
        let posted = at(0, 0);
        let exactly = posted + Duration::hours(24);
        assert!(!policy.is_due_to_mature(posted, exactly));
        assert!(policy.is_due_to_mature(posted, exactly + Duration::minutes(1)));
    }

    #[test]
    fn elapsed_minutes_since_previous_scrape() {
        assert_eq!(PointsPolicy::elapsed_minutes(Some(at(10, 0)), at(10, 5)), 5);
        assert_eq!(PointsPolicy::elapsed_minutes(None, at(10, 5)), 0);
        assert_eq!(PointsPolicy::elapsed_minutes(Some(at(10, 5)), at(10, 0)), 0);
    }

    #[test]
    fn signature_state_requires_found_and_allowed_rank() {
        assert_eq!(SignatureState::from_observation(true, true), SignatureState::Valid);
        assert_eq!(SignatureState::from_observation(true, false), SignatureState::Invalid);
        assert_eq!(SignatureState::from_observation(false, true), SignatureState::Invalid);
    }

    #[test]
    fn downtime_is_share_of_maturation_window() {
        // 144 of 1440 minutes = 10%
        assert_eq!(policy().downtime_pct(144), Decimal::from(10));
        assert_eq!(policy().downtime_pct(0), Decimal::ZERO);
    }

    #[test]
    fn uptime_threshold_is_inclusive() {
        let policy = policy();
        assert!(!policy.breaches_uptime(143));
        assert!(policy.breaches_uptime(144));
    }

    #[test]
    fn settle_drops_posts_past_the_threshold() {
        let settled = policy().settle(true, 500);
        assert!(!settled.credited);
        assert!(!settled.monitoring);
    }

    #[test]
    fn settle_credits_matured_posts_within_threshold() {
        let settled = policy().settle(true, 10);
        assert!(settled.credited);
        assert!(settled.monitoring);
    }

    #[test]
    fn settle_keeps_unmatured_posts_pending() {
        let settled = policy().settle(false, 10);
        assert!(!settled.credited);
        assert!(settled.monitoring);
    }
}
