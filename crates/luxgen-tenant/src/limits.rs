//! Resource Limits and Quota Enforcement

use crate::error::TenancyError;
use dashmap::DashMap;
use luxgen_common::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A quota ceiling; `-1` in configuration means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Limit {
    /// No ceiling
    Unlimited,
    /// Usage must stay strictly below this value
    Max(u64),
}

impl Limit {
    /// True if current usage leaves room for one more unit
    pub fn allows(&self, usage: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Max(limit) => usage < *limit,
        }
    }
}

impl From<i64> for Limit {
    fn from(raw: i64) -> Self {
        if raw < 0 { Self::Unlimited } else { Self::Max(raw as u64) }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => -1,
            Limit::Max(max) => i64::try_from(max).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Max(max) => write!(f, "{max}"),
        }
    }
}

/// Tracked resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuotaResource {
    /// Member accounts
    Users,
    /// Stored data in megabytes
    StorageMb,
    /// API calls per billing period
    ApiCalls,
    /// Open job postings
    Jobs,
}

impl QuotaResource {
    /// Every tracked resource
    pub const ALL: [QuotaResource; 4] = [
        QuotaResource::Users,
        QuotaResource::StorageMb,
        QuotaResource::ApiCalls,
        QuotaResource::Jobs,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::StorageMb => "storageMb",
            Self::ApiCalls => "apiCalls",
            Self::Jobs => "jobs",
        }
    }
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tier resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    /// Max users
    pub users: Limit,
    /// Storage quota (MB)
    pub storage_mb: Limit,
    /// API calls
    pub api_calls: Limit,
    /// Open jobs
    pub jobs: Limit,
}

impl QuotaLimits {
    /// Same limit for every resource
    pub fn uniform(limit: Limit) -> Self {
        Self { users: limit, storage_mb: limit, api_calls: limit, jobs: limit }
    }

    /// Limit for resource
    pub fn limit(&self, resource: QuotaResource) -> Limit {
        match resource {
            QuotaResource::Users => self.users,
            QuotaResource::StorageMb => self.storage_mb,
            QuotaResource::ApiCalls => self.api_calls,
            QuotaResource::Jobs => self.jobs,
        }
    }

    /// Reject if usage is at or above the limit
    pub fn check(&self, resource: QuotaResource, usage: u64) -> Result<(), TenancyError> {
        let limit = self.limit(resource);
        if limit.allows(usage) {
            Ok(())
        } else {
            Err(TenancyError::QuotaExceeded { resource, limit, usage })
        }
    }
}

/// Source of truth for per-tenant resource usage
pub trait UsageStore: Send + Sync {
    /// Current usage
    fn current(&self, tenant_id: &TenantId, resource: QuotaResource) -> u64;

    /// Atomically check `limit` and add `amount`; nothing changes on rejection
    fn try_consume(
        &self,
        tenant_id: &TenantId,
        resource: QuotaResource,
        amount: u64,
        limit: Limit,
    ) -> Result<u64, TenancyError>;

    /// Give back previously consumed units
    fn release(&self, tenant_id: &TenantId, resource: QuotaResource, amount: u64);

    /// Overwrite usage, e.g. from a reconciliation job
    fn set(&self, tenant_id: &TenantId, resource: QuotaResource, value: u64);
}

/// In-memory usage store
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counters: DashMap<(TenantId, QuotaResource), u64>,
}

impl InMemoryUsageStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn current(&self, tenant_id: &TenantId, resource: QuotaResource) -> u64 {
        self.counters
            .get(&(tenant_id.clone(), resource))
            .map(|v| *v)
            .unwrap_or(0)
    }

    fn try_consume(
        &self,
        tenant_id: &TenantId,
        resource: QuotaResource,
        amount: u64,
        limit: Limit,
    ) -> Result<u64, TenancyError> {
        // The entry guard holds the shard lock across check and increment.
        let mut usage = self.counters.entry((tenant_id.clone(), resource)).or_insert(0);
        if !limit.allows(*usage) {
            return Err(TenancyError::QuotaExceeded { resource, limit, usage: *usage });
        }
        if let Limit::Max(max) = limit {
            if usage.saturating_add(amount) > max {
                return Err(TenancyError::QuotaExceeded { resource, limit, usage: *usage });
            }
        }
        *usage = usage.saturating_add(amount);
        Ok(*usage)
    }

    fn release(&self, tenant_id: &TenantId, resource: QuotaResource, amount: u64) {
        if let Some(mut usage) = self.counters.get_mut(&(tenant_id.clone(), resource)) {
            *usage = usage.saturating_sub(amount);
        }
    }

    fn set(&self, tenant_id: &TenantId, resource: QuotaResource, value: u64) {
        self.counters.insert((tenant_id.clone(), resource), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::model::Tier;
    use proptest::prelude::*;

    #[test]
    fn test_limit_serde_uses_minus_one() {
        let limit: Limit = serde_json::from_str("-1").unwrap();
        assert_eq!(limit, Limit::Unlimited);
        assert_eq!(serde_json::to_string(&Limit::Max(10)).unwrap(), "10");
        assert_eq!(serde_json::to_string(&Limit::Unlimited).unwrap(), "-1");
    }

    #[test]
    fn test_try_consume_does_not_mutate_on_rejection() {
        let store = InMemoryUsageStore::new();
        let tenant = TenantId::new("t1");

        assert_eq!(store.try_consume(&tenant, QuotaResource::Users, 1, Limit::Max(2)).unwrap(), 1);
        assert_eq!(store.try_consume(&tenant, QuotaResource::Users, 1, Limit::Max(2)).unwrap(), 2);

        let err = store.try_consume(&tenant, QuotaResource::Users, 1, Limit::Max(2)).unwrap_err();
        assert!(matches!(err, TenancyError::QuotaExceeded { usage: 2, .. }));
        assert_eq!(store.current(&tenant, QuotaResource::Users), 2);
    }

    #[test]
    fn test_usage_is_per_tenant() {
        let store = InMemoryUsageStore::new();
        let a = TenantId::new("a");
        let b = TenantId::new("b");
        store.set(&a, QuotaResource::Jobs, 5);
        assert_eq!(store.current(&b, QuotaResource::Jobs), 0);
        store.release(&a, QuotaResource::Jobs, 2);
        assert_eq!(store.current(&a, QuotaResource::Jobs), 3);
    }

    fn any_tier() -> impl Strategy<Value = Tier> {
        prop::sample::select(Tier::ALL.to_vec())
    }

    fn any_resource() -> impl Strategy<Value = QuotaResource> {
        prop::sample::select(QuotaResource::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_quota_boundary(tier in any_tier(), resource in any_resource(), usage in 0u64..1_000_000) {
            let config = TenancyConfig::default();
            let quotas = config.quotas.get(tier);
            match quotas.limit(resource) {
                Limit::Unlimited => prop_assert!(quotas.check(resource, usage).is_ok()),
                Limit::Max(max) => {
                    prop_assert!(max > 0);
                    prop_assert!(quotas.check(resource, max - 1).is_ok());
                    prop_assert!(quotas.check(resource, max).is_err());
                    prop_assert_eq!(quotas.check(resource, usage).is_ok(), usage < max);
                }
            }
        }

        #[test]
        fn prop_unlimited_always_passes(resource in any_resource(), usage in any::<u64>()) {
            let quotas = QuotaLimits::uniform(Limit::Unlimited);
            prop_assert!(quotas.check(resource, usage).is_ok());
        }
    }
}
