//! Workflow listing and execution

use crate::error::{ApiError, ApiResult};
use crate::middleware::REQUEST_ID_HEADER;
use crate::models::{AcceptedExecution, ApiResponse, ExecutionResponse};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use luxgen_tenant::{Principal, TenantContext};
use luxgen_workflow::{
    Actor, ExecutionStatus, RegistryHealth, WorkflowContext, WorkflowDocumentation, WorkflowSummary,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Workflow routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows))
        .route("/health", get(workflow_health))
        .route("/:id/docs", get(documentation))
        .route("/:id/execute", post(execute))
}

/// Workflows the tenant may run
pub async fn list_workflows(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<ApiResponse<Vec<WorkflowSummary>>> {
    Json(ApiResponse::success(state.engine.registry().list_available(Some(ctx.tenant_id()))))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHealth {
    #[serde(flatten)]
    pub registry: RegistryHealth,
    pub tenant_workflows: Vec<String>,
}

/// Registry health plus the tenant's own overrides
pub async fn workflow_health(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<ApiResponse<WorkflowHealth>> {
    let registry = state.engine.registry();
    Json(ApiResponse::success(WorkflowHealth {
        registry: registry.health(),
        tenant_workflows: registry.tenant_workflows(ctx.tenant_id()),
    }))
}

/// Step, ordering and policy documentation
pub async fn documentation(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<WorkflowDocumentation>>> {
    let docs = state.engine.registry().documentation(&id, Some(ctx.tenant_id()))?;
    Ok(Json(ApiResponse::success(docs)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteParams {
    /// `async` runs the workflow in the background
    pub mode: Option<String>,
}

/// Run a workflow with the request body as input
pub async fn execute(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    principal: Option<Extension<Principal>>,
    Path(id): Path<String>,
    Query(params): Query<ExecuteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let input = parse_input(&body)?;
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let actor = principal.map(|Extension(p)| Actor::from(&p));
    let ctx = WorkflowContext::with_request_id(request_id, tenant, actor, input);

    if params.mode.as_deref() == Some("async") {
        let prepared = state.engine.prepare(&id, ctx)?;
        let accepted = AcceptedExecution {
            execution_id: prepared.id().to_string(),
            workflow_id: prepared.definition().id.clone(),
            status: ExecutionStatus::Pending,
        };
        let engine = state.engine.clone();
        tokio::spawn(async move {
            engine.run(prepared).await;
        });
        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))).into_response());
    }

    let run = state.engine.execute(&id, ctx).await?;
    let status = StatusCode::from_u16(run.result.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(ExecutionResponse::from(run))).into_response())
}

fn parse_input(body: &[u8]) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ApiError::BadRequest("workflow input must be a JSON object".to_string())),
        Err(err) => Err(ApiError::BadRequest(format!("invalid JSON body: {}", err))),
    }
}
