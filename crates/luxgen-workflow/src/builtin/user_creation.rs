//! `user-creation`: validate, reserve a seat, check uniqueness, create, welcome

use super::{one_of, required, ReserveQuota};
use crate::context::WorkflowContext;
use crate::definition::{step_fn, ErrorHandling, ErrorStrategy, MergeStrategy, StepType, WorkflowDefinition, WorkflowStep};
use crate::error::StepError;
use chrono::Utc;
use luxgen_tenant::{IsolationManager, QuotaResource};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Workflow id
pub const WORKFLOW_ID: &str = "user-creation";

const ROLES: &[&str] = &["user", "trainer", "manager", "admin"];

/// Definition
pub fn definition(isolation: Arc<IsolationManager>) -> WorkflowDefinition {
    WorkflowDefinition::new(WORKFLOW_ID, "1.0.0", "User Creation")
        .description("Creates a tenant user after validation, seat reservation and an email uniqueness check")
        .error_handling(ErrorHandling {
            strategy: ErrorStrategy::Compensate,
            max_retries: 3,
            retry_delay: Duration::from_millis(250),
            exponential: false,
        })
        .input_schema(json!({
            "email": "string, required",
            "firstName": "string, required",
            "lastName": "string",
            "role": ROLES,
        }))
        .step(WorkflowStep::new("validate-user", StepType::Validation, step_fn(validate_user)).not_retryable())
        .step(
            WorkflowStep::new("check-email", StepType::Validation, step_fn(check_email))
                .depends_on(&["validate-user"])
                .not_retryable(),
        )
        .step(
            WorkflowStep::new(
                "reserve-seat",
                StepType::Validation,
                Arc::new(ReserveQuota::new(isolation, QuotaResource::Users)),
            )
            .depends_on(&["validate-user"])
            .not_retryable(),
        )
        .step(
            WorkflowStep::new("create-user", StepType::BusinessLogic, step_fn(create_user))
                .depends_on(&["check-email", "reserve-seat"])
                .merge(MergeStrategy::Root),
        )
        .step(
            WorkflowStep::new("send-welcome", StepType::Notification, step_fn(send_welcome))
                .depends_on(&["create-user"])
                .non_critical()
                .timeout(Duration::from_secs(10))
                .merge(MergeStrategy::Key("welcome".to_string())),
        )
}

fn normalized_email(ctx: &WorkflowContext) -> Option<String> {
    ctx.input_str("email").map(str::to_lowercase)
}

async fn validate_user(ctx: WorkflowContext) -> Result<Value, StepError> {
    let email = required(&ctx, "email")?;
    required(&ctx, "firstName")?;
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid_email {
        return Err(StepError::validation(format!("'{}' is not a valid email address", email)));
    }
    let role = one_of(&ctx, "role", ROLES, "user")?;
    Ok(json!({ "valid": true, "role": role }))
}

async fn check_email(ctx: WorkflowContext) -> Result<Value, StepError> {
    let email = normalized_email(&ctx).unwrap_or_default();
    if ctx.scope().count("users", json!({ "email": email })) > 0 {
        return Err(StepError::permanent("USER_EXISTS", format!("a user with email '{}' already exists", email))
            .with_status(409));
    }
    Ok(json!({ "unique": true }))
}

async fn create_user(ctx: WorkflowContext) -> Result<Value, StepError> {
    let validated = ctx.output("validate-user").unwrap_or(Value::Null);
    let user_id = format!("usr_{}", Uuid::new_v4().simple());
    let email = normalized_email(&ctx);

    ctx.scope().insert(
        "users",
        json!({
            "userId": user_id,
            "email": email,
            "firstName": ctx.input_str("firstName"),
            "lastName": ctx.input_str("lastName"),
            "role": validated["role"],
            "isActive": true,
            "createdBy": ctx.user_id(),
            "createdAt": Utc::now(),
        }),
    );
    ctx.data().await.insert("userId".to_string(), json!(user_id));
    tracing::info!(tenant_id = %ctx.tenant_id(), user_id = %user_id, "user created");

    Ok(json!({ "userId": user_id, "email": email, "role": validated["role"] }))
}

async fn send_welcome(ctx: WorkflowContext) -> Result<Value, StepError> {
    let user_id = ctx.data().await.get("userId").cloned().unwrap_or(Value::Null);
    ctx.scope().insert(
        "outbox",
        json!({
            "type": "welcome_email",
            "userId": user_id,
            "to": normalized_email(&ctx),
            "brand": ctx.tenant_settings().get("brandName").cloned().unwrap_or_else(|| json!(ctx.tenant_slug())),
        }),
    );
    Ok(json!({ "queued": true }))
}
