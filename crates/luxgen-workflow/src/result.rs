//! Workflow results

use crate::error::StepError;
use crate::store::ExecutionStatus;
use chrono::{DateTime, Utc};
use luxgen_common::{AuditEntry, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error entry in a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultError {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether the failure was transient
    pub retryable: bool,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
    /// Failing step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl ResultError {
    /// Entry for a failed step
    pub fn from_step(step_id: &str, err: &StepError) -> Self {
        Self {
            code: err.code.clone(),
            message: err.message.clone(),
            retryable: err.retryable,
            timestamp: Utc::now(),
            step_id: Some(step_id.to_string()),
        }
    }

    /// Entry for a workflow-level error
    pub fn from_error<E: ErrorCode>(err: &E) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: false,
            timestamp: Utc::now(),
            step_id: None,
        }
    }
}

/// Outcome of a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// True iff no critical step failed and the run was not cancelled
    pub success: bool,
    /// Summary
    pub message: String,
    /// Merged step outputs
    pub data: Map<String, Value>,
    /// Step errors in the order they were recorded
    pub errors: Vec<ResultError>,
    /// HTTP-equivalent status
    pub status_code: u16,
}

impl WorkflowResult {
    /// Successful result
    pub fn ok(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { success: true, message: message.into(), data, errors: Vec::new(), status_code: 200 }
    }

    /// Failed result
    pub fn failed(message: impl Into<String>, status_code: u16, errors: Vec<ResultError>) -> Self {
        Self { success: false, message: message.into(), data: Map::new(), errors, status_code }
    }
}

/// A finished execution as returned to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Execution id for polling
    pub execution_id: String,
    /// Workflow id
    pub workflow_id: String,
    /// Definition version that ran
    pub version: String,
    /// Final status
    pub status: ExecutionStatus,
    /// Reduced result
    pub result: WorkflowResult,
    /// Audit trail of the execution
    pub audit_trail: Vec<AuditEntry>,
}

impl WorkflowRun {
    /// Audit actions in order
    pub fn actions(&self) -> Vec<&str> {
        self.audit_trail.iter().map(|e| e.action.as_str()).collect()
    }
}
