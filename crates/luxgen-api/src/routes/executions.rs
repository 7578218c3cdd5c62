//! Execution status, cancellation and statistics

use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use luxgen_tenant::{Principal, TenantContext};
use luxgen_workflow::{ExecutionStats, WorkflowError, WorkflowExecution};
use serde::{Deserialize, Serialize};

/// Role allowed to read platform-wide statistics
pub const GLOBAL_STATS_ROLE: &str = "super_admin";

/// Execution routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/executions/:id", get(execution_status))
        .route("/executions/:id/cancel", post(cancel_execution))
        .route("/stats", get(statistics))
}

/// Load an execution owned by the caller's tenant; foreign ids look missing
fn owned_execution(state: &AppState, ctx: &TenantContext, id: &str) -> ApiResult<WorkflowExecution> {
    let execution = state.engine.execution_status(id)?;
    if &execution.tenant_id != ctx.tenant_id() {
        tracing::warn!(
            execution_id = id,
            tenant_id = %ctx.tenant_id(),
            "cross-tenant execution lookup"
        );
        return Err(WorkflowError::ExecutionNotFound(id.to_string()).into());
    }
    Ok(execution)
}

/// Execution record
pub async fn execution_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<WorkflowExecution>>> {
    Ok(Json(ApiResponse::success(owned_execution(&state, &ctx, &id)?)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub execution_id: String,
    pub cancelled: bool,
}

/// Stop scheduling further steps of a running execution
pub async fn cancel_execution(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<CancelResponse>>> {
    owned_execution(&state, &ctx, &id)?;
    let cancelled = state.engine.cancel(&id)?;
    Ok(Json(ApiResponse::success(CancelResponse { execution_id: id, cancelled })))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub scope: Option<String>,
}

/// Statistics for the caller's tenant, or every tenant for super admins
pub async fn statistics(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    principal: Option<Extension<Principal>>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<ApiResponse<ExecutionStats>>> {
    if params.scope.as_deref() == Some("global") {
        let allowed = principal
            .as_ref()
            .and_then(|Extension(p)| p.role.as_deref())
            .is_some_and(|role| role == GLOBAL_STATS_ROLE);
        if !allowed {
            return Err(ApiError::Forbidden("global statistics require super_admin".to_string()));
        }
        return Ok(Json(ApiResponse::success(state.engine.statistics(None))));
    }
    Ok(Json(ApiResponse::success(state.engine.statistics(Some(ctx.tenant_id())))))
}
