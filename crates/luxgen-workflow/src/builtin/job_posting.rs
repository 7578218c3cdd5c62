//! `job-post-management`: validate, reserve quota, store, index, notify

use super::{one_of, required, ReserveQuota};
use crate::context::WorkflowContext;
use crate::definition::{step_fn, ErrorHandling, ErrorStrategy, MergeStrategy, StepType, WorkflowDefinition, WorkflowStep};
use crate::error::StepError;
use chrono::Utc;
use luxgen_tenant::{IsolationManager, QuotaResource};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Workflow id
pub const WORKFLOW_ID: &str = "job-post-management";

const EMPLOYMENT_TYPES: &[&str] = &["full-time", "part-time", "contract", "internship", "temporary"];
const STATUSES: &[&str] = &["published", "draft"];
const MAX_TITLE_LEN: usize = 200;

/// Definition
pub fn definition(isolation: Arc<IsolationManager>) -> WorkflowDefinition {
    WorkflowDefinition::new(WORKFLOW_ID, "1.0.0", "Job Post Management")
        .description("Validates a job posting, reserves job quota, stores it and fans it out to search and alerts")
        .error_handling(ErrorHandling {
            strategy: ErrorStrategy::Compensate,
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
            exponential: true,
        })
        .input_schema(json!({
            "title": "string, required",
            "description": "string, required",
            "location": "string",
            "employmentType": EMPLOYMENT_TYPES,
            "status": STATUSES,
        }))
        .step(WorkflowStep::new("validate-job", StepType::Validation, step_fn(validate_job)).not_retryable())
        .step(
            WorkflowStep::new(
                "reserve-job-quota",
                StepType::Validation,
                Arc::new(ReserveQuota::new(isolation, QuotaResource::Jobs)),
            )
            .depends_on(&["validate-job"])
            .not_retryable(),
        )
        .step(
            WorkflowStep::new("create-job", StepType::BusinessLogic, step_fn(create_job))
                .depends_on(&["reserve-job-quota"])
                .merge(MergeStrategy::Root),
        )
        .step(
            WorkflowStep::new("index-job", StepType::Transform, step_fn(index_job))
                .depends_on(&["create-job"])
                .non_critical()
                .merge(MergeStrategy::Key("search".to_string())),
        )
        .step(
            WorkflowStep::new("notify-subscribers", StepType::Notification, step_fn(notify_subscribers))
                .depends_on(&["create-job"])
                .non_critical()
                .timeout(Duration::from_secs(10))
                .merge(MergeStrategy::Key("notifications".to_string())),
        )
}

async fn validate_job(ctx: WorkflowContext) -> Result<Value, StepError> {
    let title = required(&ctx, "title")?;
    required(&ctx, "description")?;
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(StepError::validation(format!("'title' exceeds {} characters", MAX_TITLE_LEN)));
    }
    let employment_type = one_of(&ctx, "employmentType", EMPLOYMENT_TYPES, "full-time")?;
    let status = one_of(&ctx, "status", STATUSES, "published")?;
    Ok(json!({ "valid": true, "employmentType": employment_type, "status": status }))
}

async fn create_job(ctx: WorkflowContext) -> Result<Value, StepError> {
    let validated = ctx.output("validate-job").unwrap_or(Value::Null);
    let job_id = format!("job_{}", Uuid::new_v4().simple());
    let now = Utc::now();

    let job = ctx.scope().insert(
        "jobs",
        json!({
            "jobId": job_id,
            "title": ctx.input_str("title"),
            "description": ctx.input_str("description"),
            "location": ctx.input_str("location"),
            "employmentType": validated["employmentType"],
            "status": validated["status"],
            "postedBy": ctx.user_id(),
            "createdAt": now,
        }),
    );
    ctx.data().await.insert("jobId".to_string(), json!(job_id));
    tracing::info!(tenant_id = %ctx.tenant_id(), job_id = %job_id, "job created");

    Ok(json!({ "jobId": job_id, "status": job["status"], "createdAt": now }))
}

async fn index_job(ctx: WorkflowContext) -> Result<Value, StepError> {
    let job_id = ctx.data().await.get("jobId").cloned().unwrap_or(Value::Null);
    let text = format!(
        "{} {}",
        ctx.input_str("title").unwrap_or_default(),
        ctx.input_str("description").unwrap_or_default()
    );
    let terms: BTreeSet<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect();

    ctx.scope().insert("search_index", json!({ "jobId": job_id, "terms": terms }));
    Ok(json!({ "indexed": true, "terms": terms.len() }))
}

async fn notify_subscribers(ctx: WorkflowContext) -> Result<Value, StepError> {
    let job_id = ctx.data().await.get("jobId").cloned().unwrap_or(Value::Null);
    let recipients = ctx.scope().count("job_alerts", json!({ "active": true }));
    if recipients > 0 {
        ctx.scope().insert(
            "outbox",
            json!({ "type": "job_alert", "jobId": job_id, "recipients": recipients }),
        );
    }
    ctx.audit_event("notification_queued", WORKFLOW_ID, json!({ "jobId": job_id, "recipients": recipients }));
    Ok(json!({ "queued": recipients }))
}
