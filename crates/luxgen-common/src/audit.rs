//! Append-only audit trail
//!
//! Tenant access and workflow execution events are recorded here. Entries
//! are never mutated or removed by the platform; retention is an external
//! policy.

use crate::TenantId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Event name, e.g. `tenant_resolved`, `step_started`
    pub action: String,
    /// Owning tenant, when known
    pub tenant_id: Option<TenantId>,
    /// Acting user, when known
    pub user_id: Option<String>,
    /// Resource the event concerns
    pub resource: String,
    /// Free-form details
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// Create entry stamped with the current time
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            tenant_id: None,
            user_id: None,
            resource: resource.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach tenant
    pub fn tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Attach user
    pub fn user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Attach details
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Shared append-only log
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl AuditLog {
    /// Create empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&self, entry: AuditEntry) {
        tracing::trace!(
            action = %entry.action,
            resource = %entry.resource,
            tenant_id = ?entry.tenant_id,
            "audit"
        );
        self.entries.write().push(entry);
    }

    /// Snapshot of all entries in append order
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Entries for one tenant
    pub fn for_tenant(&self, tenant_id: &TenantId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.tenant_id.as_ref() == Some(tenant_id))
            .cloned()
            .collect()
    }

    /// Actions in append order
    pub fn actions(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.action.clone()).collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
