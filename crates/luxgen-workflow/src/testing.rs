//! Test fixtures

use crate::context::{Actor, WorkflowContext};
use luxgen_tenant::{
    IdentificationMethod, InMemoryHandleFactory, InMemoryUsageStore, IsolationManager, Resolution, TenancyConfig,
    Tenant, TenantContext, Tier,
};
use serde_json::Value;
use std::sync::Arc;

pub fn isolation() -> Arc<IsolationManager> {
    Arc::new(IsolationManager::new(
        Arc::new(TenancyConfig::default()),
        Arc::new(InMemoryHandleFactory::new()),
        Arc::new(InMemoryUsageStore::new()),
    ))
}

pub async fn tenant_context(isolation: &IsolationManager, slug: &str, tier: Tier) -> TenantContext {
    let resolution = Resolution {
        tenant: Arc::new(Tenant::new(slug, slug, tier)),
        method: IdentificationMethod::Header,
    };
    isolation.isolate(&resolution).await.unwrap()
}

pub async fn context(slug: &str, tier: Tier, input: Value) -> WorkflowContext {
    let isolation = isolation();
    context_with(&isolation, slug, tier, input).await
}

pub async fn context_with(isolation: &IsolationManager, slug: &str, tier: Tier, input: Value) -> WorkflowContext {
    let tenant = tenant_context(isolation, slug, tier).await;
    WorkflowContext::new(tenant, Some(Actor::new("user-1", Some("admin"))), input)
}
