//! Data isolation
//!
//! The isolation manager owns the tenant → resource handle cache and hands
//! each request a [`TenantContext`] whose [`TenantScope`] is the only way to
//! reach tenant data. Every payload and query that goes through the scope
//! carries the tenant filter.

use crate::config::TenancyConfig;
use crate::entitlements;
use crate::error::{TenancyError, TenancyResult};
use crate::limits::{QuotaLimits, QuotaResource, UsageStore};
use crate::metering::UsageTracker;
use crate::model::Tenant;
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use crate::resolver::{IdentificationMethod, Resolution};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use luxgen_common::TenantId;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Field every tenant document carries
pub const TENANT_FIELD: &str = "tenantId";

/// Shared per-tenant resource handle
pub type ResourceHandle = Arc<TenantDatabase>;

/// Per-tenant document namespace
#[derive(Debug)]
pub struct TenantDatabase {
    tenant_id: TenantId,
    namespace: String,
    created_at: DateTime<Utc>,
    collections: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl TenantDatabase {
    /// Open an empty namespace
    pub fn new(tenant_id: TenantId, namespace: impl Into<String>) -> Self {
        Self {
            tenant_id,
            namespace: namespace.into(),
            created_at: Utc::now(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Owning tenant
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Namespace name
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// When the handle was constructed
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn insert_raw(&self, collection: &str, doc: Map<String, Value>) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub(crate) fn find_raw(&self, collection: &str, query: &Map<String, Value>) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| query.iter().all(|(k, v)| doc.get(k) == Some(v)))
                    .map(|doc| Value::Object(doc.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Builds resource handles
#[async_trait]
pub trait HandleFactory: Send + Sync {
    /// Open the handle for a tenant namespace
    async fn connect(&self, tenant_id: &TenantId, namespace: &str) -> TenancyResult<ResourceHandle>;
}

/// In-memory handle factory
#[derive(Debug, Default)]
pub struct InMemoryHandleFactory {
    constructed: AtomicUsize,
}

impl InMemoryHandleFactory {
    /// Create factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles built so far
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandleFactory for InMemoryHandleFactory {
    async fn connect(&self, tenant_id: &TenantId, namespace: &str) -> TenancyResult<ResourceHandle> {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TenantDatabase::new(tenant_id.clone(), namespace)))
    }
}

/// Filter merged into every tenant read and write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantFilter {
    /// Tenant
    pub tenant_id: TenantId,
}

impl TenantFilter {
    /// Filter for tenant
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Merge into a query or payload, overriding any caller-supplied tenant
    pub fn apply(&self, target: &mut Map<String, Value>) {
        target.insert(TENANT_FIELD.to_string(), Value::String(self.tenant_id.to_string()));
    }

    /// True if the document belongs to this tenant
    pub fn matches(&self, doc: &Value) -> bool {
        doc.get(TENANT_FIELD).and_then(Value::as_str) == Some(self.tenant_id.as_str())
    }
}

/// Tenant-scoped data access
#[derive(Debug, Clone)]
pub struct TenantScope {
    handle: ResourceHandle,
    filter: TenantFilter,
}

impl TenantScope {
    /// Scope over a handle
    pub fn new(handle: ResourceHandle, filter: TenantFilter) -> Self {
        Self { handle, filter }
    }

    /// Insert a document, returning it with the tenant field set
    pub fn insert(&self, collection: &str, payload: Value) -> Value {
        let mut doc = into_object(payload);
        self.filter.apply(&mut doc);
        self.handle.insert_raw(collection, doc.clone());
        Value::Object(doc)
    }

    /// Documents matching every field of `query`
    pub fn find(&self, collection: &str, query: Value) -> Vec<Value> {
        let mut query = into_object(query);
        self.filter.apply(&mut query);
        self.handle
            .find_raw(collection, &query)
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .collect()
    }

    /// Count of matching documents
    pub fn count(&self, collection: &str, query: Value) -> usize {
        self.find(collection, query).len()
    }

    /// Filter in force
    pub fn filter(&self) -> &TenantFilter {
        &self.filter
    }

    /// Underlying handle
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Request-scoped tenant context
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant: Arc<Tenant>,
    method: IdentificationMethod,
    scope: TenantScope,
    quotas: QuotaLimits,
}

impl TenantContext {
    /// Resolved tenant
    pub fn tenant(&self) -> &Arc<Tenant> {
        &self.tenant
    }

    /// Tenant id
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant.id
    }

    /// How the tenant was identified
    pub fn method(&self) -> IdentificationMethod {
        self.method
    }

    /// Scoped data access
    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Tenant filter
    pub fn filter(&self) -> &TenantFilter {
        self.scope.filter()
    }

    /// Quotas for the tenant's tier
    pub fn quotas(&self) -> &QuotaLimits {
        &self.quotas
    }

    /// Check a feature tag
    pub fn check_feature(&self, feature: &str) -> TenancyResult<()> {
        entitlements::check_feature_access(&self.tenant, feature)
    }
}

/// Isolation manager
///
/// Sole owner of the tenant → handle cache. One instance per process,
/// injected wherever tenant resources are needed.
pub struct IsolationManager {
    config: Arc<TenancyConfig>,
    factory: Arc<dyn HandleFactory>,
    handles: DashMap<TenantId, Arc<OnceCell<ResourceHandle>>>,
    usage: Arc<dyn UsageStore>,
    rate_limiter: RateLimiter,
    tracker: UsageTracker,
}

impl IsolationManager {
    /// Create manager
    pub fn new(
        config: Arc<TenancyConfig>,
        factory: Arc<dyn HandleFactory>,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_window(), config.rate_limits.clone());
        Self {
            config,
            factory,
            handles: DashMap::new(),
            usage,
            rate_limiter,
            tracker: UsageTracker::new(),
        }
    }

    /// Build the tenant context for a resolved request
    pub async fn isolate(&self, resolution: &Resolution) -> TenancyResult<TenantContext> {
        let tenant = &resolution.tenant;
        if !tenant.is_active {
            return Err(TenancyError::TenantInactive(tenant.slug.clone()));
        }

        let handle = self.handle(&tenant.id).await?;
        tracing::debug!(tenant_id = %tenant.id, method = %resolution.method, "tenant isolated");

        Ok(TenantContext {
            tenant: Arc::clone(tenant),
            method: resolution.method,
            scope: TenantScope::new(handle, TenantFilter::new(tenant.id.clone())),
            quotas: self.config.quotas.get(tenant.tier).clone(),
        })
    }

    /// Isolate, failing if no tenant was resolved
    pub async fn isolate_request(&self, resolution: Option<&Resolution>) -> TenancyResult<TenantContext> {
        match resolution {
            Some(resolution) => self.isolate(resolution).await,
            None => Err(TenancyError::TenantContextMissing),
        }
    }

    async fn handle(&self, tenant_id: &TenantId) -> TenancyResult<ResourceHandle> {
        // Clone the cell out so no map guard is held across the await.
        let cell = self
            .handles
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let handle = cell
            .get_or_try_init(|| async move {
                let namespace = self.config.namespace_for(tenant_id.as_str());
                tracing::info!(tenant_id = %tenant_id, "opening tenant resource handle");
                self.factory.connect(tenant_id, &namespace).await.map_err(|err| {
                    tracing::error!(tenant_id = %tenant_id, "tenant handle construction failed: {}", err);
                    err
                })
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Cached handle, if one exists
    pub fn cached_handle(&self, tenant_id: &TenantId) -> Option<ResourceHandle> {
        self.handles.get(tenant_id).and_then(|cell| cell.get().cloned())
    }

    /// Number of live handles
    pub fn cached_handles(&self) -> usize {
        self.handles.iter().filter(|cell| cell.initialized()).count()
    }

    /// Drop a tenant's handle; the next request reconnects
    pub fn evict(&self, tenant_id: &TenantId) -> bool {
        let evicted = self.handles.remove(tenant_id).is_some();
        if evicted {
            tracing::info!(tenant_id = %tenant_id, "tenant resource handle evicted");
        }
        evicted
    }

    /// Reject if any listed resource is at or above quota
    pub fn enforce_resource_quotas(&self, ctx: &TenantContext, resources: &[QuotaResource]) -> TenancyResult<()> {
        for resource in resources {
            let usage = self.usage.current(ctx.tenant_id(), *resource);
            if let Err(err) = ctx.quotas().check(*resource, usage) {
                self.quota_rejected(ctx, *resource);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Atomically reserve `amount` units of a resource
    pub fn consume_quota(&self, ctx: &TenantContext, resource: QuotaResource, amount: u64) -> TenancyResult<u64> {
        let limit = ctx.quotas().limit(resource);
        self.usage
            .try_consume(ctx.tenant_id(), resource, amount, limit)
            .map_err(|err| {
                self.quota_rejected(ctx, resource);
                err
            })
    }

    /// Return previously reserved units
    pub fn release_quota(&self, ctx: &TenantContext, resource: QuotaResource, amount: u64) {
        self.usage.release(ctx.tenant_id(), resource, amount);
    }

    fn quota_rejected(&self, ctx: &TenantContext, resource: QuotaResource) {
        tracing::warn!(tenant_id = %ctx.tenant_id(), resource = %resource, "quota exceeded");
        metrics::counter!("luxgen_quota_rejections_total", "resource" => resource.as_str()).increment(1);
    }

    /// Feature gate
    pub fn check_feature_access(&self, ctx: &TenantContext, feature: &str) -> TenancyResult<()> {
        ctx.check_feature(feature)
    }

    /// Count a request against the `(client, tenant)` window
    pub fn check_rate_limit(&self, ctx: &TenantContext, client: &str) -> TenancyResult<RateLimitDecision> {
        let decision = self.rate_limiter.check(client, ctx.tenant_id(), ctx.tenant().tier);
        if decision.allowed {
            Ok(decision)
        } else {
            tracing::warn!(tenant_id = %ctx.tenant_id(), client, "rate limit exceeded");
            Err(TenancyError::RateLimited { retry_after: decision.retry_after })
        }
    }

    /// Drop expired rate-limit windows, returning how many
    pub fn purge_rate_limits(&self) -> usize {
        let purged = self.rate_limiter.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired rate limit windows dropped");
        }
        purged
    }

    /// Number of live rate-limit windows
    pub fn rate_limit_windows(&self) -> usize {
        self.rate_limiter.tracked()
    }

    /// Advisory usage telemetry
    pub fn track_usage(&self, ctx: &TenantContext, caller: &str) {
        self.tracker.record(ctx.tenant_id(), caller);
    }

    /// Usage store
    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    /// Usage tracker
    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    /// Configuration
    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{InMemoryUsageStore, Limit};
    use crate::model::Tier;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    fn manager_with(factory: Arc<dyn HandleFactory>) -> IsolationManager {
        IsolationManager::new(
            Arc::new(TenancyConfig::default()),
            factory,
            Arc::new(InMemoryUsageStore::new()),
        )
    }

    fn resolution(tenant: Tenant) -> Resolution {
        Resolution { tenant: Arc::new(tenant), method: IdentificationMethod::Header }
    }

    #[tokio::test]
    async fn test_repeated_isolation_returns_same_handle() {
        let factory = Arc::new(InMemoryHandleFactory::new());
        let manager = manager_with(factory.clone());
        let acme = resolution(Tenant::new("acme", "acme", Tier::Enterprise));

        let first = manager.isolate(&acme).await.unwrap();
        let second = manager.isolate(&acme).await.unwrap();

        assert!(Arc::ptr_eq(first.scope().handle(), second.scope().handle()));
        assert_eq!(factory.constructed(), 1);
        assert_eq!(first.scope().handle().namespace(), "luxgen_tenant_acme");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_constructs_once() {
        let factory = Arc::new(InMemoryHandleFactory::new());
        let manager = Arc::new(manager_with(factory.clone()));
        let acme = resolution(Tenant::new("acme", "acme", Tier::Premium));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let acme = acme.clone();
                tokio::spawn(async move { manager.isolate(&acme).await.unwrap() })
            })
            .collect();

        let mut contexts = Vec::new();
        for task in tasks {
            contexts.push(task.await.unwrap());
        }

        assert_eq!(factory.constructed(), 1);
        assert!(contexts
            .windows(2)
            .all(|w| Arc::ptr_eq(w[0].scope().handle(), w[1].scope().handle())));
    }

    #[tokio::test]
    async fn test_inactive_tenant_never_gets_a_handle() {
        let factory = Arc::new(InMemoryHandleFactory::new());
        let manager = manager_with(factory.clone());
        let dormant = resolution(Tenant::new("dormant", "dormant", Tier::Free).deactivated());

        let err = manager.isolate(&dormant).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantInactive(_)));
        assert_eq!(factory.constructed(), 0);
        assert_eq!(manager.cached_handles(), 0);
    }

    #[tokio::test]
    async fn test_missing_resolution() {
        let manager = manager_with(Arc::new(InMemoryHandleFactory::new()));
        let err = manager.isolate_request(None).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantContextMissing));
    }

    struct FailOnce {
        failed: AtomicBool,
        inner: InMemoryHandleFactory,
    }

    #[async_trait]
    impl HandleFactory for FailOnce {
        async fn connect(&self, tenant_id: &TenantId, namespace: &str) -> TenancyResult<ResourceHandle> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(TenancyError::HandleUnavailable("connection refused".into()));
            }
            self.inner.connect(tenant_id, namespace).await
        }
    }

    #[tokio::test]
    async fn test_failed_construction_is_not_cached() {
        let manager = manager_with(Arc::new(FailOnce {
            failed: AtomicBool::new(false),
            inner: InMemoryHandleFactory::new(),
        }));
        let acme = resolution(Tenant::new("acme", "acme", Tier::Standard));

        tokio_test::assert_err!(manager.isolate(&acme).await);
        assert!(manager.cached_handle(&acme.tenant.id).is_none());
        tokio_test::assert_ok!(manager.isolate(&acme).await);
        assert!(manager.cached_handle(&acme.tenant.id).is_some());
    }

    #[tokio::test]
    async fn test_evict_forces_reconnect() {
        let factory = Arc::new(InMemoryHandleFactory::new());
        let manager = manager_with(factory.clone());
        let acme = resolution(Tenant::new("acme", "acme", Tier::Standard));

        let first = manager.isolate(&acme).await.unwrap();
        assert!(manager.evict(&acme.tenant.id));
        let second = manager.isolate(&acme).await.unwrap();

        assert!(!Arc::ptr_eq(first.scope().handle(), second.scope().handle()));
        assert_eq!(factory.constructed(), 2);
    }

    #[tokio::test]
    async fn test_scope_always_carries_tenant_filter() {
        let manager = manager_with(Arc::new(InMemoryHandleFactory::new()));
        let ctx = manager
            .isolate(&resolution(Tenant::new("acme", "acme", Tier::Standard)))
            .await
            .unwrap();

        let stored = ctx.scope().insert("jobs", json!({"title": "Engineer", "tenantId": "globex"}));
        assert_eq!(stored["tenantId"], "acme");

        // A caller-supplied tenant in the query is overridden by the filter.
        assert_eq!(ctx.scope().count("jobs", json!({"tenantId": "globex"})), 1);
        assert_eq!(ctx.scope().find("jobs", json!({"title": "Engineer"})).len(), 1);
        assert_eq!(ctx.scope().count("jobs", json!({"title": "Designer"})), 0);
    }

    #[tokio::test]
    async fn test_tenants_do_not_see_each_other() {
        let manager = manager_with(Arc::new(InMemoryHandleFactory::new()));
        let acme = manager.isolate(&resolution(Tenant::new("acme", "acme", Tier::Standard))).await.unwrap();
        let globex = manager.isolate(&resolution(Tenant::new("globex", "globex", Tier::Standard))).await.unwrap();

        acme.scope().insert("jobs", json!({"title": "Engineer"}));
        assert_eq!(globex.scope().count("jobs", Value::Null), 0);
        assert_eq!(acme.scope().count("jobs", Value::Null), 1);
    }

    #[tokio::test]
    async fn test_quota_enforcement_uses_usage_store() {
        let manager = manager_with(Arc::new(InMemoryHandleFactory::new()));
        let ctx = manager.isolate(&resolution(Tenant::new("t1", "t1", Tier::Free))).await.unwrap();
        let Limit::Max(max_users) = ctx.quotas().users else { panic!("free tier is limited") };

        manager.usage_store().set(ctx.tenant_id(), QuotaResource::Users, max_users - 1);
        tokio_test::assert_ok!(manager.enforce_resource_quotas(&ctx, &[QuotaResource::Users]));

        manager.usage_store().set(ctx.tenant_id(), QuotaResource::Users, max_users);
        let err = manager.enforce_resource_quotas(&ctx, &QuotaResource::ALL).unwrap_err();
        assert!(matches!(err, TenancyError::QuotaExceeded { resource: QuotaResource::Users, .. }));
    }

    #[tokio::test]
    async fn test_enterprise_quota_is_unlimited() {
        let manager = manager_with(Arc::new(InMemoryHandleFactory::new()));
        let ctx = manager.isolate(&resolution(Tenant::new("big", "big", Tier::Enterprise))).await.unwrap();
        manager.usage_store().set(ctx.tenant_id(), QuotaResource::Jobs, u64::MAX - 1);
        tokio_test::assert_ok!(manager.enforce_resource_quotas(&ctx, &QuotaResource::ALL));
        tokio_test::assert_ok!(manager.consume_quota(&ctx, QuotaResource::Jobs, 1));
    }
}
