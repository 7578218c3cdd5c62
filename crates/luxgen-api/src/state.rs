//! Shared application state

use crate::auth::JwtAuth;
use crate::config::PlatformConfig;
use luxgen_common::AuditLog;
use luxgen_tenant::{
    InMemoryHandleFactory, InMemoryTenantDirectory, InMemoryUsageStore, IsolationManager, TenantDirectory,
    TenantResolver,
};
use luxgen_workflow::{builtin, EngineResult, WorkflowEngine, WorkflowRegistry};
use std::sync::Arc;

/// Application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<PlatformConfig>,
    /// Tenant directory
    pub directory: Arc<InMemoryTenantDirectory>,
    /// Tenant resolver
    pub resolver: Arc<TenantResolver>,
    /// Isolation manager
    pub isolation: Arc<IsolationManager>,
    /// Workflow engine
    pub engine: Arc<WorkflowEngine>,
    /// Process-wide audit trail
    pub audit: AuditLog,
    /// Token verification
    pub auth: Arc<JwtAuth>,
}

impl AppState {
    /// Wire every component from configuration
    pub fn from_config(config: PlatformConfig) -> EngineResult<Self> {
        let config = Arc::new(config);
        let tenancy = Arc::new(config.tenancy.clone());
        let audit = AuditLog::new();

        let directory = Arc::new(InMemoryTenantDirectory::with_tenants(config.tenants.iter().cloned()));
        let resolver = Arc::new(TenantResolver::new(
            Arc::clone(&directory) as Arc<dyn TenantDirectory>,
            Arc::clone(&tenancy),
            audit.clone(),
        ));
        let isolation = Arc::new(IsolationManager::new(
            tenancy,
            Arc::new(InMemoryHandleFactory::new()),
            Arc::new(InMemoryUsageStore::new()),
        ));

        let registry = Arc::new(WorkflowRegistry::new());
        builtin::register_builtin(&registry, Arc::clone(&isolation))?;
        let engine = Arc::new(WorkflowEngine::new(registry).with_audit(audit.clone()));

        tracing::info!(
            tenants = directory.len(),
            workflows = engine.registry().len(),
            "application state ready"
        );

        Ok(Self {
            auth: Arc::new(JwtAuth::new(&config.auth)),
            config,
            directory,
            resolver,
            isolation,
            engine,
            audit,
        })
    }
}
