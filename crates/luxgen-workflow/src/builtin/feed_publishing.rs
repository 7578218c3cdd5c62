//! `feed-publishing`: validate, publish, fan out to followers

use super::{one_of, required};
use crate::context::WorkflowContext;
use crate::definition::{step_fn, MergeStrategy, StepType, WorkflowDefinition, WorkflowStep};
use crate::error::StepError;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

/// Workflow id
pub const WORKFLOW_ID: &str = "feed-publishing";

const VISIBILITY: &[&str] = &["public", "connections", "private"];
const MAX_CONTENT_LEN: usize = 5000;

/// Definition
pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new(WORKFLOW_ID, "1.0.0", "Feed Publishing")
        .description("Publishes a post to the tenant feed and fans it out to the author's followers")
        .requires_feature("basic_workflows")
        .input_schema(json!({
            "content": "string, required",
            "visibility": VISIBILITY,
            "tags": "string[]",
        }))
        .step(WorkflowStep::new("validate-post", StepType::Validation, step_fn(validate_post)).not_retryable())
        .step(
            WorkflowStep::new("publish-post", StepType::BusinessLogic, step_fn(publish_post))
                .depends_on(&["validate-post"])
                .merge(MergeStrategy::Root),
        )
        .step(
            WorkflowStep::new("fan-out", StepType::Notification, step_fn(fan_out))
                .depends_on(&["publish-post"])
                .non_critical()
                .merge(MergeStrategy::Key("delivery".to_string())),
        )
}

async fn validate_post(ctx: WorkflowContext) -> Result<Value, StepError> {
    if ctx.user_id().is_none() {
        return Err(StepError::permanent("AUTHOR_REQUIRED", "posts need an authenticated author").with_status(401));
    }
    let content = required(&ctx, "content")?;
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(StepError::validation(format!("'content' exceeds {} characters", MAX_CONTENT_LEN)));
    }
    let visibility = one_of(&ctx, "visibility", VISIBILITY, "public")?;
    Ok(json!({ "valid": true, "visibility": visibility }))
}

async fn publish_post(ctx: WorkflowContext) -> Result<Value, StepError> {
    let validated = ctx.output("validate-post").unwrap_or(Value::Null);
    let post_id = format!("post_{}", Uuid::new_v4().simple());
    let tags: Vec<String> = ctx
        .input()
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_lowercase).collect())
        .unwrap_or_default();

    ctx.scope().insert(
        "posts",
        json!({
            "postId": post_id,
            "authorId": ctx.user_id(),
            "content": ctx.input_str("content"),
            "visibility": validated["visibility"],
            "tags": tags,
            "publishedAt": Utc::now(),
        }),
    );
    ctx.data().await.insert("postId".to_string(), json!(post_id));

    Ok(json!({ "postId": post_id, "visibility": validated["visibility"] }))
}

async fn fan_out(ctx: WorkflowContext) -> Result<Value, StepError> {
    let post_id = ctx.data().await.get("postId").cloned().unwrap_or(Value::Null);
    let validated = ctx.output("validate-post").unwrap_or(Value::Null);
    if validated["visibility"] == "private" {
        return Ok(json!({ "recipients": 0 }));
    }

    let followers = ctx.scope().find("follows", json!({ "followee": ctx.user_id() }));
    for follow in &followers {
        ctx.scope().insert("feed_items", json!({ "owner": follow["follower"], "postId": post_id }));
    }
    Ok(json!({ "recipients": followers.len() }))
}
