//! Execution store
//!
//! Records every execution keyed by its generated id until age-based
//! cleanup removes it.

use crate::result::ResultError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use luxgen_common::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Execution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created, not yet scheduled
    Pending,
    /// Steps are running
    Running,
    /// Finished without critical failure
    Completed,
    /// A critical step failed
    Failed,
    /// Cancelled by request
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the execution has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    /// Execution id
    pub id: String,
    /// Workflow id
    pub workflow_id: String,
    /// Definition version
    pub version: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Acting user
    pub user_id: Option<String>,
    /// Lifecycle status
    pub status: ExecutionStatus,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
    /// Successful step outputs
    pub results: Map<String, Value>,
    /// Step errors
    pub errors: Vec<ResultError>,
    /// Attempts per step
    pub attempts: HashMap<String, u32>,
    /// Free-form metadata
    pub metadata: Value,
}

impl WorkflowExecution {
    /// New pending execution
    pub fn new(id: String, workflow_id: &str, version: &str, tenant_id: TenantId, user_id: Option<String>) -> Self {
        Self {
            id,
            workflow_id: workflow_id.to_string(),
            version: version.to_string(),
            tenant_id,
            user_id,
            status: ExecutionStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            results: Map::new(),
            errors: Vec::new(),
            attempts: HashMap::new(),
            metadata: Value::Null,
        }
    }

    /// Wall-clock duration, if finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Aggregate statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    /// All executions
    pub total: usize,
    /// Completed
    pub passed: usize,
    /// Failed
    pub failed: usize,
    /// Pending or running
    pub running: usize,
    /// Cancelled
    pub cancelled: usize,
    /// passed / total as a percentage
    pub success_rate: f64,
}

/// Concurrent execution store
#[derive(Debug, Default)]
pub struct ExecutionStore {
    executions: DashMap<String, WorkflowExecution>,
}

impl ExecutionStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace
    pub fn insert(&self, execution: WorkflowExecution) {
        self.executions.insert(execution.id.clone(), execution);
    }

    /// Mutate a record in place
    pub fn update<F: FnOnce(&mut WorkflowExecution)>(&self, id: &str, f: F) -> bool {
        match self.executions.get_mut(id) {
            Some(mut execution) => {
                f(&mut execution);
                true
            }
            None => false,
        }
    }

    /// Move a pending record to running; finished records keep their status
    pub fn mark_running(&self, id: &str) -> bool {
        match self.executions.get_mut(id) {
            Some(mut execution) if !execution.status.is_terminal() => {
                execution.status = ExecutionStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of a record
    pub fn get(&self, id: &str) -> Option<WorkflowExecution> {
        self.executions.get(id).map(|e| e.clone())
    }

    /// Executions owned by a tenant
    pub fn for_tenant(&self, tenant_id: &TenantId) -> Vec<WorkflowExecution> {
        self.executions
            .iter()
            .filter(|e| &e.tenant_id == tenant_id)
            .map(|e| e.clone())
            .collect()
    }

    /// Statistics, optionally for one tenant
    pub fn statistics(&self, tenant_id: Option<&TenantId>) -> ExecutionStats {
        let mut stats = ExecutionStats::default();
        for execution in self.executions.iter() {
            if tenant_id.is_some_and(|t| t != &execution.tenant_id) {
                continue;
            }
            stats.total += 1;
            match execution.status {
                ExecutionStatus::Completed => stats.passed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Cancelled => stats.cancelled += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => stats.running += 1,
            }
        }
        if stats.total > 0 {
            stats.success_rate = stats.passed as f64 / stats.total as f64 * 100.0;
        }
        stats
    }

    /// Remove finished executions older than `max_age`, returning how many
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::weeks(5200));
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };
        let before = self.executions.len();
        self.executions
            .retain(|_, e| !(e.status.is_terminal() && e.end_time.is_some_and(|end| end < cutoff)));
        let removed = before.saturating_sub(self.executions.len());
        if removed > 0 {
            tracing::info!(removed, "cleaned up finished executions");
        }
        removed
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}
