//! Tenancy configuration
//!
//! Header/query names, the default tenant, the per-tenant namespace prefix
//! and the per-tier quota and rate-limit tables are all supplied from
//! outside; the defaults here only exist so a bare deployment boots.

use crate::limits::{Limit, QuotaLimits};
use crate::model::TierTable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tenancy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Header carrying a tenant id or slug
    pub tenant_header: String,
    /// Query parameter carrying a tenant slug
    pub tenant_query_param: String,
    /// Slug used when nothing else identifies the tenant
    pub default_tenant: Option<String>,
    /// Subdomains that never name a tenant
    pub reserved_subdomains: Vec<String>,
    /// Prefix for per-tenant database namespaces
    pub db_prefix: String,
    /// Fixed rate-limit window
    pub rate_limit_window_secs: u64,
    /// Requests per window, per tier
    pub rate_limits: TierTable<u32>,
    /// Resource quotas, per tier
    pub quotas: TierTable<QuotaLimits>,
}

impl TenancyConfig {
    /// Rate-limit window as a duration
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    /// Namespace name for tenant
    pub fn namespace_for(&self, tenant_id: &str) -> String {
        format!("{}{}", self.db_prefix, tenant_id)
    }

    /// True if `label` may not be treated as a tenant subdomain
    pub fn is_reserved_subdomain(&self, label: &str) -> bool {
        self.reserved_subdomains.iter().any(|r| r.eq_ignore_ascii_case(label))
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            tenant_header: "x-tenant-id".to_string(),
            tenant_query_param: "tenant".to_string(),
            default_tenant: None,
            reserved_subdomains: ["www", "app", "api", "admin"]
                .into_iter()
                .map(String::from)
                .collect(),
            db_prefix: "luxgen_tenant_".to_string(),
            rate_limit_window_secs: 15 * 60,
            rate_limits: TierTable {
                free: 100,
                standard: 500,
                premium: 2000,
                enterprise: 10_000,
            },
            quotas: TierTable {
                free: QuotaLimits {
                    users: Limit::Max(10),
                    storage_mb: Limit::Max(1024),
                    api_calls: Limit::Max(1_000),
                    jobs: Limit::Max(5),
                },
                standard: QuotaLimits {
                    users: Limit::Max(100),
                    storage_mb: Limit::Max(10 * 1024),
                    api_calls: Limit::Max(10_000),
                    jobs: Limit::Max(50),
                },
                premium: QuotaLimits {
                    users: Limit::Max(1_000),
                    storage_mb: Limit::Max(100 * 1024),
                    api_calls: Limit::Max(100_000),
                    jobs: Limit::Max(500),
                },
                enterprise: QuotaLimits::uniform(Limit::Unlimited),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: TenancyConfig = serde_json::from_value(serde_json::json!({
            "default_tenant": "luxgen",
            "quotas": {
                "free": {"users": 3, "storageMb": 10, "apiCalls": 10, "jobs": 1},
                "standard": {"users": -1, "storageMb": -1, "apiCalls": -1, "jobs": -1},
                "premium": {"users": -1, "storageMb": -1, "apiCalls": -1, "jobs": -1},
                "enterprise": {"users": -1, "storageMb": -1, "apiCalls": -1, "jobs": -1}
            }
        }))
        .unwrap();

        assert_eq!(config.tenant_header, "x-tenant-id");
        assert_eq!(config.default_tenant.as_deref(), Some("luxgen"));
        assert_eq!(config.quotas.get(Tier::Free).users, Limit::Max(3));
        assert_eq!(config.quotas.get(Tier::Standard).users, Limit::Unlimited);
    }

    #[test]
    fn test_rate_limits_increase_with_tier() {
        let config = TenancyConfig::default();
        let ceilings: Vec<u32> = Tier::ALL.iter().map(|t| *config.rate_limits.get(*t)).collect();
        assert!(ceilings.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_namespace_and_reserved() {
        let config = TenancyConfig::default();
        assert_eq!(config.namespace_for("acme"), "luxgen_tenant_acme");
        assert!(config.is_reserved_subdomain("WWW"));
        assert!(!config.is_reserved_subdomain("acme"));
    }
}
