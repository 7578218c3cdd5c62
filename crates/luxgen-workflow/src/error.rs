//! Workflow errors

use luxgen_common::{ErrorCode, Retryable};
use luxgen_tenant::TenancyError;
use std::time::Duration;
use thiserror::Error;

/// Result alias
pub type EngineResult<T> = Result<T, WorkflowError>;

/// Errors that stop a workflow before, or instead of, running its steps
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No definition under this id
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Tenant may not run this definition
    #[error("workflow '{workflow}' is not available to tenant {tenant}")]
    PolicyViolation {
        /// Workflow id
        workflow: String,
        /// Requesting tenant
        tenant: String,
    },

    /// Step graph contains a cycle
    #[error("workflow '{workflow}' has a dependency cycle through: {}", steps.join(", "))]
    CyclicDependency {
        /// Workflow id
        workflow: String,
        /// Steps left unscheduled by the cycle
        steps: Vec<String>,
    },

    /// A step depends on an id that does not exist
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Declaring step
        step: String,
        /// Missing dependency
        dependency: String,
    },

    /// Two steps share an id
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    /// No execution under this id
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Tenancy rejection (feature gate, quota, ...)
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
}

impl ErrorCode for WorkflowError {
    fn code(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::PolicyViolation { .. } => "WORKFLOW_POLICY_VIOLATION",
            Self::CyclicDependency { .. } => "CYCLIC_DEPENDENCY",
            Self::UnknownDependency { .. } => "UNKNOWN_DEPENDENCY",
            Self::DuplicateStep(_) => "DUPLICATE_STEP",
            Self::ExecutionNotFound(_) => "EXECUTION_NOT_FOUND",
            Self::Tenancy(err) => err.code(),
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::WorkflowNotFound(_) | Self::ExecutionNotFound(_) => 404,
            Self::PolicyViolation { .. } => 403,
            Self::CyclicDependency { .. } | Self::UnknownDependency { .. } | Self::DuplicateStep(_) => 500,
            Self::Tenancy(err) => err.status_code(),
        }
    }
}

/// Kind of step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorKind {
    /// Handler returned an error
    Execution,
    /// Handler exceeded its timeout
    Timeout,
    /// Handler panicked
    Panicked,
}

/// Failure reported by, or on behalf of, a step
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    /// Kind
    pub kind: StepErrorKind,
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether another attempt may succeed
    pub retryable: bool,
    /// HTTP-equivalent status if this failure ends the workflow
    pub status_code: u16,
}

impl StepError {
    /// Transient execution failure
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Execution,
            code: "STEP_EXECUTION_ERROR".to_string(),
            message: message.into(),
            retryable: true,
            status_code: 500,
        }
    }

    /// Failure that retrying cannot fix
    pub fn permanent(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            retryable: false,
            ..Self::new(message)
        }
    }

    /// Invalid input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::permanent("VALIDATION_ERROR", message).with_status(400)
    }

    /// Deadline exceeded
    pub fn timeout(step_id: &str, timeout: Duration) -> Self {
        Self {
            kind: StepErrorKind::Timeout,
            code: "STEP_TIMEOUT".to_string(),
            message: format!("step '{}' timed out after {}ms", step_id, timeout.as_millis()),
            retryable: true,
            status_code: 504,
        }
    }

    /// Handler panicked
    pub fn panicked(step_id: &str) -> Self {
        Self {
            kind: StepErrorKind::Panicked,
            code: "STEP_EXECUTION_ERROR".to_string(),
            message: format!("step '{}' failed unexpectedly", step_id),
            retryable: false,
            status_code: 500,
        }
    }

    /// Override status
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }
}

impl Retryable for StepError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<TenancyError> for StepError {
    fn from(err: TenancyError) -> Self {
        Self::permanent(err.code(), err.to_string()).with_status(err.status_code())
    }
}
