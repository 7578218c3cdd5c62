//! Rate Limiting
//!
//! Fixed-window counters keyed by `(client, tenant)` so one tenant's traffic
//! never draws down another tenant's budget. Ceilings come from the tier.

use crate::model::{Tier, TierTable};
use dashmap::DashMap;
use luxgen_common::TenantId;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Ceiling for the window
    pub limit: u32,
    /// Requests left in the window
    pub remaining: u32,
    /// Time until the window resets
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-(client, tenant) fixed-window limiter
pub struct RateLimiter {
    window: Duration,
    ceilings: TierTable<u32>,
    windows: DashMap<(String, TenantId), Window>,
}

impl RateLimiter {
    /// Create limiter
    pub fn new(window: Duration, ceilings: TierTable<u32>) -> Self {
        Self {
            window,
            ceilings,
            windows: DashMap::new(),
        }
    }

    /// Count one request and decide
    pub fn check(&self, client: &str, tenant_id: &TenantId, tier: Tier) -> RateLimitDecision {
        let limit = *self.ceilings.get(tier);
        let now = Instant::now();

        let mut window = self
            .windows
            .entry((client.to_string(), tenant_id.clone()))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        let retry_after = self.window.saturating_sub(now.duration_since(window.started));

        if window.count >= limit {
            return RateLimitDecision { allowed: false, limit, remaining: 0, retry_after };
        }
        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - window.count,
            retry_after,
        }
    }

    /// Drop windows that have expired, returning how many
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked windows
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window: Duration) -> RateLimiter {
        RateLimiter::new(window, TierTable { free: 2, standard: 3, premium: 4, enterprise: 5 })
    }

    #[test]
    fn test_ceiling_per_tier() {
        let limiter = limiter(Duration::from_secs(60));
        let tenant = TenantId::new("t1");

        assert!(limiter.check("10.0.0.1", &tenant, Tier::Free).allowed);
        let second = limiter.check("10.0.0.1", &tenant, Tier::Free);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!limiter.check("10.0.0.1", &tenant, Tier::Free).allowed);
    }

    #[test]
    fn test_budget_is_keyed_by_tenant() {
        let limiter = limiter(Duration::from_secs(60));
        let a = TenantId::new("a");
        let b = TenantId::new("b");

        for _ in 0..2 {
            limiter.check("shared-client", &a, Tier::Free);
        }
        assert!(!limiter.check("shared-client", &a, Tier::Free).allowed);
        assert!(limiter.check("shared-client", &b, Tier::Free).allowed);
        assert!(limiter.check("other-client", &a, Tier::Free).allowed);
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(Duration::from_millis(20));
        let tenant = TenantId::new("t1");
        for _ in 0..2 {
            limiter.check("c", &tenant, Tier::Free);
        }
        assert!(!limiter.check("c", &tenant, Tier::Free).allowed);

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("c", &tenant, Tier::Free).allowed);
        assert_eq!(limiter.purge_expired(), 0);
        assert_eq!(limiter.tracked(), 1);

        limiter.check("other", &tenant, Tier::Free);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.purge_expired(), 2);
        assert_eq!(limiter.tracked(), 0);
    }
}
