//! Usage tracking
//!
//! Advisory per-tenant telemetry: request counts, last access and distinct
//! callers. Quota decisions never read from here.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use luxgen_common::TenantId;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug)]
struct TenantUsage {
    requests: u64,
    last_access: DateTime<Utc>,
    callers: HashSet<String>,
}

/// Snapshot of one tenant's usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// Tenant
    pub tenant_id: TenantId,
    /// Requests seen
    pub requests: u64,
    /// Most recent request
    pub last_access: DateTime<Utc>,
    /// Distinct callers seen
    pub distinct_callers: usize,
}

/// In-memory usage counters
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: DashMap<TenantId, TenantUsage>,
}

impl UsageTracker {
    /// Create tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request
    pub fn record(&self, tenant_id: &TenantId, caller: &str) {
        let now = Utc::now();
        let mut usage = self.usage.entry(tenant_id.clone()).or_insert_with(|| TenantUsage {
            requests: 0,
            last_access: now,
            callers: HashSet::new(),
        });
        usage.requests += 1;
        usage.last_access = now;
        usage.callers.insert(caller.to_string());
    }

    /// Snapshot for tenant
    pub fn snapshot(&self, tenant_id: &TenantId) -> Option<UsageSnapshot> {
        self.usage.get(tenant_id).map(|u| UsageSnapshot {
            tenant_id: tenant_id.clone(),
            requests: u.requests,
            last_access: u.last_access,
            distinct_callers: u.callers.len(),
        })
    }

    /// Snapshots for every tenant
    pub fn all(&self) -> Vec<UsageSnapshot> {
        self.usage
            .iter()
            .map(|u| UsageSnapshot {
                tenant_id: u.key().clone(),
                requests: u.requests,
                last_access: u.last_access,
                distinct_callers: u.callers.len(),
            })
            .collect()
    }
}
