/// Throughput needed to scrape every active profile once per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeRate {
    PerSecond(u64),
    PerMinute(u64),
}

impl ScrapeRate {
    /// Whole profiles per second when that exceeds one, else whole profiles
    /// per minute when that exceeds one, else one per second.
    #[must_use]
    pub fn for_profiles(active_profiles: u64, interval_secs: u64) -> Self {
        let interval_secs = interval_secs.max(1);

        let per_sec = active_profiles / interval_secs;
        if per_sec > 1 {
            return ScrapeRate::PerSecond(per_sec);
        }

        let per_min = active_profiles.saturating_mul(60) / interval_secs;
        if per_min > 1 {
            return ScrapeRate::PerMinute(per_min);
        }

        ScrapeRate::PerSecond(1)
    }
}

impl std::fmt::Display for ScrapeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeRate::PerSecond(n) => write!(f, "{n}/s"),
            ScrapeRate::PerMinute(n) => write!(f, "{n}/m"),
        }
    }
}
