//! Workflow definitions
//!
//! A definition is an immutable, versioned DAG of steps. Steps are
//! executed by [`Step`] handlers; the engine owns scheduling, retries,
//! timeouts and result merging.

use crate::context::WorkflowContext;
use crate::error::StepError;
use async_trait::async_trait;
use luxgen_common::{BackoffPolicy, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default per-step timeout
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Step handler
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step, returning its output
    async fn execute(&self, ctx: &WorkflowContext) -> Result<Value, StepError>;

    /// Undo the step after a later critical failure
    async fn compensate(&self, _ctx: &WorkflowContext) -> Result<(), StepError> {
        Ok(())
    }
}

/// Closure-backed step
pub struct FnStep<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    async fn execute(&self, ctx: &WorkflowContext) -> Result<Value, StepError> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a step handler
pub fn step_fn<F, Fut>(f: F) -> Arc<dyn Step>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    Arc::new(FnStep { f })
}

/// Step category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Input or precondition checks
    Validation,
    /// Domain logic
    BusinessLogic,
    /// Outbound side effects
    Notification,
    /// Data shaping
    Transform,
}

/// How a step's output is merged into the result data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "key")]
pub enum MergeStrategy {
    /// Under the step id
    StepId,
    /// Under a custom key
    Key(String),
    /// Object fields spread into the top level
    Root,
}

/// What happens when a critical step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Retry retryable steps, then fail
    Retry,
    /// Fail on first error without retrying
    Abort,
    /// Retry, then undo completed steps in reverse order
    Compensate,
}

/// Workflow-level error handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandling {
    /// Strategy
    pub strategy: ErrorStrategy,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay between attempts
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Double the delay after each retry
    pub exponential: bool,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::Retry,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            exponential: false,
        }
    }
}

impl ErrorHandling {
    /// Retry policy for one step
    pub fn policy_for(&self, step: &WorkflowStep) -> BackoffPolicy {
        if !step.retryable || self.strategy == ErrorStrategy::Abort || self.max_retries == 0 {
            return BackoffPolicy::none();
        }
        if self.exponential {
            BackoffPolicy::exponential(self.max_retries, self.retry_delay, self.retry_delay * 32)
        } else {
            BackoffPolicy::fixed(self.max_retries, self.retry_delay)
        }
    }
}

/// One node of the workflow graph
#[derive(Clone)]
pub struct WorkflowStep {
    /// Unique within the workflow
    pub id: String,
    /// Category
    pub step_type: StepType,
    /// Steps that must finish first
    pub dependencies: Vec<String>,
    /// Per-attempt deadline
    pub timeout: Duration,
    /// Whether failures may be retried
    pub retryable: bool,
    /// Whether failure aborts the workflow
    pub critical: bool,
    /// Output merge
    pub merge: MergeStrategy,
    /// Handler
    pub handler: Arc<dyn Step>,
}

impl std::fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("id", &self.id)
            .field("step_type", &self.step_type)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("retryable", &self.retryable)
            .field("critical", &self.critical)
            .finish()
    }
}

impl WorkflowStep {
    /// Critical, retryable step with no dependencies
    pub fn new(id: &str, step_type: StepType, handler: Arc<dyn Step>) -> Self {
        Self {
            id: id.to_string(),
            step_type,
            dependencies: Vec::new(),
            timeout: DEFAULT_STEP_TIMEOUT,
            retryable: true,
            critical: true,
            merge: MergeStrategy::StepId,
            handler,
        }
    }

    /// Add dependencies
    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.dependencies.extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// Set timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Failures are never retried
    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Failures are recorded but do not abort the workflow
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Set merge strategy
    pub fn merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }
}

/// Versioned workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Workflow id
    pub id: String,
    /// Semantic version
    pub version: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Steps in declaration order
    pub steps: Vec<Arc<WorkflowStep>>,
    /// Error handling
    pub error_handling: ErrorHandling,
    /// Registered for specific tenants
    pub tenant_specific: bool,
    /// Tenants outside `bound_tenants` may run it
    pub cross_tenant_allowed: bool,
    /// Tenants bound to this definition; empty means unbound
    pub bound_tenants: BTreeSet<TenantId>,
    /// Feature tag required to run it
    pub required_feature: Option<String>,
    /// Shape of the expected input, for documentation
    pub input_schema: Value,
}

impl WorkflowDefinition {
    /// Create an empty definition
    pub fn new(id: &str, version: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            name: name.to_string(),
            description: String::new(),
            steps: Vec::new(),
            error_handling: ErrorHandling::default(),
            tenant_specific: false,
            cross_tenant_allowed: true,
            bound_tenants: BTreeSet::new(),
            required_feature: None,
            input_schema: Value::Null,
        }
    }

    /// Set description
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Append a step
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Set error handling
    pub fn error_handling(mut self, error_handling: ErrorHandling) -> Self {
        self.error_handling = error_handling;
        self
    }

    /// Bind to a tenant and forbid other tenants
    pub fn bind_to(mut self, tenant_id: TenantId) -> Self {
        self.tenant_specific = true;
        self.cross_tenant_allowed = false;
        self.bound_tenants.insert(tenant_id);
        self
    }

    /// Require a feature tag
    pub fn requires_feature(mut self, feature: &str) -> Self {
        self.required_feature = Some(feature.to_string());
        self
    }

    /// Document the input shape
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Look up a step
    pub fn get_step(&self, id: &str) -> Option<&Arc<WorkflowStep>> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Whether `tenant_id` may run this definition
    pub fn permits(&self, tenant_id: &TenantId) -> bool {
        self.cross_tenant_allowed || self.bound_tenants.is_empty() || self.bound_tenants.contains(tenant_id)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
