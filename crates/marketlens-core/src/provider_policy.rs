use std::time::Duration;

use crate::ProviderId;

/// Rollover boundary of a long-window quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    /// Resets at midnight UTC.
    Daily,
    /// Resets on the first day of each month, UTC.
    Monthly,
}

/// Long-window request budget enforced independently of the request gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongWindowQuota {
    pub window: QuotaWindow,
    pub limit: u32,
}

impl LongWindowQuota {
    pub const fn daily(limit: u32) -> Self {
        Self {
            window: QuotaWindow::Daily,
            limit,
        }
    }

    pub const fn monthly(limit: u32) -> Self {
        Self {
            window: QuotaWindow::Monthly,
            limit,
        }
    }
}

/// Per-provider rate policy: minimum gap between request starts plus an
/// optional long-window quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub min_interval: Duration,
    pub quota: Option<LongWindowQuota>,
}

impl ProviderPolicy {
    pub const fn new(
        provider_id: ProviderId,
        min_interval: Duration,
        quota: Option<LongWindowQuota>,
    ) -> Self {
        Self {
            provider_id,
            min_interval,
            quota,
        }
    }

    /// Free-tier limits as published by each provider.
    pub const fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            // 5/min, 25/day
            ProviderId::Alphavantage => Self::new(
                provider_id,
                Duration::from_secs(12),
                Some(LongWindowQuota::daily(25)),
            ),
            // 60/min
            ProviderId::Finnhub => Self::new(provider_id, Duration::from_secs(1), None),
            // 5/min
            ProviderId::Polygon => Self::new(provider_id, Duration::from_secs(12), None),
            // 30/min, 10k/month on the demo plan
            ProviderId::Coingecko => Self::new(
                provider_id,
                Duration::from_secs(2),
                Some(LongWindowQuota::monthly(10_000)),
            ),
            // 120/min
            ProviderId::Fred => Self::new(provider_id, Duration::from_millis(500), None),
            // 10/s fair-access limit
            ProviderId::Sec => Self::new(provider_id, Duration::from_millis(100), None),
            // 100/day developer plan
            ProviderId::Newsapi => Self::new(
                provider_id,
                Duration::from_secs(1),
                Some(LongWindowQuota::daily(100)),
            ),
            // 200/hour unauthenticated
            ProviderId::Stocktwits => Self::new(provider_id, Duration::from_secs(18), None),
            ProviderId::Fixture => Self::unthrottled(provider_id),
        }
    }

    /// No gap and no quota.
    pub const fn unthrottled(provider_id: ProviderId) -> Self {
        Self::new(provider_id, Duration::ZERO, None)
    }

    pub const fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub const fn with_quota(mut self, quota: Option<LongWindowQuota>) -> Self {
        self.quota = quota;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphavantage_policy_matches_free_tier() {
        let policy = ProviderPolicy::default_for(ProviderId::Alphavantage);

        assert_eq!(policy.provider_id, ProviderId::Alphavantage);
        assert_eq!(policy.min_interval, Duration::from_secs(12));
        assert_eq!(policy.quota, Some(LongWindowQuota::daily(25)));
    }

    #[test]
    fn coingecko_quota_rolls_over_monthly() {
        let policy = ProviderPolicy::default_for(ProviderId::Coingecko);

        assert_eq!(policy.min_interval, Duration::from_secs(2));
        assert_eq!(
            policy.quota.map(|quota| quota.window),
            Some(QuotaWindow::Monthly)
        );
    }

    #[test]
    fn every_live_provider_has_a_gap() {
        for provider in ProviderId::LIVE {
            assert!(
                ProviderPolicy::default_for(provider).min_interval > Duration::ZERO,
                "{provider}"
            );
        }
        assert_eq!(
            ProviderPolicy::default_for(ProviderId::Fixture).min_interval,
            Duration::ZERO
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let policy = ProviderPolicy::default_for(ProviderId::Newsapi)
            .with_min_interval(Duration::from_millis(5))
            .with_quota(Some(LongWindowQuota::daily(2)));

        assert_eq!(policy.min_interval, Duration::from_millis(5));
        assert_eq!(policy.quota.map(|quota| quota.limit), Some(2));
    }
}
