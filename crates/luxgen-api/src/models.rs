//! Response models

use luxgen_workflow::{ExecutionStatus, WorkflowResult, WorkflowRun};
use serde::Serialize;

/// Successful response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always true; failures use the error envelope
    pub success: bool,
    /// Payload
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Result of a synchronous workflow execution
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Workflow id
    pub workflow_id: String,
    /// Execution id for later lookups
    pub execution_id: String,
    /// Definition version that ran
    pub version: String,
    /// Final status
    pub status: ExecutionStatus,
    /// Reduced result
    #[serde(flatten)]
    pub result: WorkflowResult,
}

impl From<WorkflowRun> for ExecutionResponse {
    fn from(run: WorkflowRun) -> Self {
        Self {
            workflow_id: run.workflow_id,
            execution_id: run.execution_id,
            version: run.version,
            status: run.status,
            result: run.result,
        }
    }
}

/// Acknowledgement for a background execution
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedExecution {
    /// Execution id to poll
    pub execution_id: String,
    /// Workflow id
    pub workflow_id: String,
    /// Status at acceptance
    pub status: ExecutionStatus,
}
