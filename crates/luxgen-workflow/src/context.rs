//! Per-execution workflow context

use luxgen_common::{AuditEntry, AuditLog, TenantId};
use luxgen_tenant::{Principal, Tenant, TenantContext, TenantScope};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Acting user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// User id
    pub user_id: String,
    /// Role
    pub role: Option<String>,
}

impl Actor {
    /// Create actor
    pub fn new(user_id: &str, role: Option<&str>) -> Self {
        Self { user_id: user_id.to_string(), role: role.map(str::to_string) }
    }
}

impl From<&Principal> for Actor {
    fn from(principal: &Principal) -> Self {
        Self { user_id: principal.user_id.clone(), role: principal.role.clone() }
    }
}

/// Context handed to every step of one execution.
///
/// Cheap to clone; clones share the data bag, step outputs and audit
/// trail. A context belongs to exactly one execution.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    request_id: String,
    tenant: TenantContext,
    actor: Option<Actor>,
    input: Value,
    data: Mutex<Map<String, Value>>,
    outputs: RwLock<HashMap<String, Value>>,
    failed: RwLock<HashSet<String>>,
    audit: AuditLog,
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("request_id", &self.inner.request_id)
            .field("tenant_id", self.tenant_id())
            .field("actor", &self.inner.actor)
            .finish()
    }
}

impl WorkflowContext {
    /// Create a context for one execution
    pub fn new(tenant: TenantContext, actor: Option<Actor>, input: Value) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), tenant, actor, input)
    }

    /// Create a context carrying an upstream request id
    pub fn with_request_id(request_id: String, tenant: TenantContext, actor: Option<Actor>, input: Value) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id,
                tenant,
                actor,
                input,
                data: Mutex::new(Map::new()),
                outputs: RwLock::new(HashMap::new()),
                failed: RwLock::new(HashSet::new()),
                audit: AuditLog::new(),
            }),
        }
    }

    /// Request id
    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Tenant context
    pub fn tenant_context(&self) -> &TenantContext {
        &self.inner.tenant
    }

    /// Tenant
    pub fn tenant(&self) -> &Arc<Tenant> {
        self.inner.tenant.tenant()
    }

    /// Tenant id
    pub fn tenant_id(&self) -> &TenantId {
        self.inner.tenant.tenant_id()
    }

    /// Tenant slug
    pub fn tenant_slug(&self) -> &str {
        &self.tenant().slug
    }

    /// Tenant settings
    pub fn tenant_settings(&self) -> &Value {
        &self.tenant().settings
    }

    /// Tenant-scoped data access
    pub fn scope(&self) -> &TenantScope {
        self.inner.tenant.scope()
    }

    /// Acting user
    pub fn actor(&self) -> Option<&Actor> {
        self.inner.actor.as_ref()
    }

    /// Acting user id
    pub fn user_id(&self) -> Option<&str> {
        self.inner.actor.as_ref().map(|a| a.user_id.as_str())
    }

    /// Execution input
    pub fn input(&self) -> &Value {
        &self.inner.input
    }

    /// Input field as a trimmed, non-empty string
    pub fn input_str(&self, field: &str) -> Option<&str> {
        self.inner.input.get(field).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Lock the shared data bag.
    ///
    /// Concurrently running steps are serialized on this lock.
    pub async fn data(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.inner.data.lock().await
    }

    /// Output of a completed step
    pub fn output(&self, step_id: &str) -> Option<Value> {
        self.inner.outputs.read().get(step_id).cloned()
    }

    /// Whether a dependency finished with a recorded failure
    pub fn step_failed(&self, step_id: &str) -> bool {
        self.inner.failed.read().contains(step_id)
    }

    pub(crate) fn record_output(&self, step_id: &str, output: Value) {
        self.inner.outputs.write().insert(step_id.to_string(), output);
    }

    pub(crate) fn record_failure(&self, step_id: &str) {
        self.inner.failed.write().insert(step_id.to_string());
    }

    /// Audit trail of this execution
    pub fn audit(&self) -> &AuditLog {
        &self.inner.audit
    }

    /// Append an audit entry attributed to this tenant and actor
    pub fn audit_event(&self, action: &str, resource: &str, details: Value) {
        self.inner.audit.record(
            AuditEntry::new(action, resource)
                .tenant(Some(self.tenant_id().clone()))
                .user(self.user_id().map(str::to_string))
                .details(details),
        );
    }
}
