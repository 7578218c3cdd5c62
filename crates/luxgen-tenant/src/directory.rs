//! Tenant directory
//!
//! Read-only lookup of tenant records. In production this is backed by the
//! tenant management store; the in-memory implementation serves tests and
//! single-node deployments seeded from configuration.

use crate::error::TenancyResult;
use crate::model::Tenant;
use async_trait::async_trait;
use dashmap::DashMap;
use luxgen_common::TenantId;
use std::sync::Arc;

/// Tenant lookup contract
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Lookup by id
    async fn find_by_id(&self, id: &str) -> TenancyResult<Option<Arc<Tenant>>>;

    /// Lookup by slug (case-insensitive)
    async fn find_by_slug(&self, slug: &str) -> TenancyResult<Option<Arc<Tenant>>>;

    /// Lookup by custom domain (case-insensitive, exact)
    async fn find_by_domain(&self, domain: &str) -> TenancyResult<Option<Arc<Tenant>>>;

    /// Lookup by id, falling back to slug
    async fn find_by_id_or_slug(&self, key: &str) -> TenancyResult<Option<Arc<Tenant>>> {
        match self.find_by_id(key).await? {
            Some(tenant) => Ok(Some(tenant)),
            None => self.find_by_slug(key).await,
        }
    }
}

/// In-memory directory
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    by_id: DashMap<TenantId, Arc<Tenant>>,
    slugs: DashMap<String, TenantId>,
    domains: DashMap<String, TenantId>,
}

impl InMemoryTenantDirectory {
    /// Create empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records
    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let directory = Self::new();
        for tenant in tenants {
            directory.upsert(tenant);
        }
        directory
    }

    /// Insert or replace a tenant record
    pub fn upsert(&self, tenant: Tenant) {
        self.remove(&tenant.id);
        let id = tenant.id.clone();
        self.slugs.insert(tenant.slug.to_lowercase(), id.clone());
        for domain in &tenant.domains {
            self.domains.insert(domain.to_lowercase(), id.clone());
        }
        tracing::debug!(tenant_id = %id, slug = %tenant.slug, "tenant record stored");
        self.by_id.insert(id, Arc::new(tenant));
    }

    /// Remove a tenant record
    pub fn remove(&self, id: &TenantId) -> Option<Arc<Tenant>> {
        let (_, tenant) = self.by_id.remove(id)?;
        self.slugs.remove(&tenant.slug.to_lowercase());
        for domain in &tenant.domains {
            self.domains.remove(&domain.to_lowercase());
        }
        Some(tenant)
    }

    /// Number of tenants
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn get(&self, id: Option<TenantId>) -> Option<Arc<Tenant>> {
        id.and_then(|id| self.by_id.get(&id).map(|t| Arc::clone(t.value())))
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_id(&self, id: &str) -> TenancyResult<Option<Arc<Tenant>>> {
        Ok(self.get(Some(TenantId::new(id))))
    }

    async fn find_by_slug(&self, slug: &str) -> TenancyResult<Option<Arc<Tenant>>> {
        let id = self.slugs.get(&slug.to_lowercase()).map(|id| id.value().clone());
        Ok(self.get(id))
    }

    async fn find_by_domain(&self, domain: &str) -> TenancyResult<Option<Arc<Tenant>>> {
        let id = self.domains.get(&domain.to_lowercase()).map(|id| id.value().clone());
        Ok(self.get(id))
    }
}
