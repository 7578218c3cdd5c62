//! Built-in platform workflows

pub mod feed_publishing;
pub mod job_posting;
pub mod user_creation;

use crate::context::WorkflowContext;
use crate::definition::Step;
use crate::error::{EngineResult, StepError};
use crate::registry::WorkflowRegistry;
use async_trait::async_trait;
use luxgen_tenant::{IsolationManager, QuotaResource};
use serde_json::{json, Value};
use std::sync::Arc;

/// Register every built-in workflow
pub fn register_builtin(registry: &WorkflowRegistry, isolation: Arc<IsolationManager>) -> EngineResult<()> {
    registry.register(user_creation::definition(Arc::clone(&isolation)))?;
    registry.register(job_posting::definition(isolation))?;
    registry.register(feed_publishing::definition())?;
    Ok(())
}

/// Reserves one unit of a quota; compensation gives it back
pub struct ReserveQuota {
    isolation: Arc<IsolationManager>,
    resource: QuotaResource,
}

impl ReserveQuota {
    /// Create step
    pub fn new(isolation: Arc<IsolationManager>, resource: QuotaResource) -> Self {
        Self { isolation, resource }
    }
}

#[async_trait]
impl Step for ReserveQuota {
    async fn execute(&self, ctx: &WorkflowContext) -> Result<Value, StepError> {
        let tenant = ctx.tenant_context();
        let usage = self.isolation.consume_quota(tenant, self.resource, 1)?;
        Ok(json!({
            "resource": self.resource.as_str(),
            "usage": usage,
            "limit": tenant.quotas().limit(self.resource),
        }))
    }

    async fn compensate(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        self.isolation.release_quota(ctx.tenant_context(), self.resource, 1);
        Ok(())
    }
}

/// Required, trimmed, non-empty string field
fn required<'a>(ctx: &'a WorkflowContext, field: &str) -> Result<&'a str, StepError> {
    ctx.input_str(field)
        .ok_or_else(|| StepError::validation(format!("'{}' is required", field)))
}

/// Optional string field restricted to `allowed`, falling back to `default`
fn one_of<'a>(ctx: &'a WorkflowContext, field: &str, allowed: &[&'static str], default: &'static str) -> Result<&'a str, StepError> {
    match ctx.input_str(field) {
        None => Ok(default),
        Some(value) if allowed.contains(&value) => Ok(value),
        Some(value) => Err(StepError::validation(format!(
            "'{}' must be one of {}, got '{}'",
            field,
            allowed.join(", "),
            value
        ))),
    }
}
