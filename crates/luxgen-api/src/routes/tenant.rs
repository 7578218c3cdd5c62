//! Tenant introspection

use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use luxgen_tenant::entitlements::effective_features;
use luxgen_tenant::{QuotaLimits, QuotaResource, TenantContext, UsageSnapshot};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Tenant routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(current_tenant))
        .route("/usage", get(usage))
        .route("/features/:feature", get(check_feature))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub tier: String,
    pub identified_by: String,
    pub features: BTreeSet<String>,
    pub quotas: QuotaLimits,
    pub usage: BTreeMap<&'static str, u64>,
}

/// Resolved tenant and how it was identified
pub async fn current_tenant(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<ApiResponse<TenantSummary>>> {
    let tenant = ctx.tenant();
    let store = state.isolation.usage_store();
    let usage = QuotaResource::ALL
        .iter()
        .map(|resource| (resource.as_str(), store.current(ctx.tenant_id(), *resource)))
        .collect();

    Ok(Json(ApiResponse::success(TenantSummary {
        id: tenant.id.to_string(),
        slug: tenant.slug.clone(),
        name: tenant.name.clone(),
        tier: tenant.tier.as_str().to_string(),
        identified_by: ctx.method().as_str().to_string(),
        features: effective_features(tenant),
        quotas: ctx.quotas().clone(),
        usage,
    })))
}

/// Request tracking for the current tenant
pub async fn usage(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<ApiResponse<Option<UsageSnapshot>>>> {
    Ok(Json(ApiResponse::success(state.isolation.tracker().snapshot(ctx.tenant_id()))))
}

#[derive(Serialize)]
pub struct FeatureCheck {
    pub feature: String,
    pub enabled: bool,
}

/// 200 when the tenant may use `feature`, 403 otherwise
pub async fn check_feature(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(feature): Path<String>,
) -> ApiResult<Json<ApiResponse<FeatureCheck>>> {
    state.isolation.check_feature_access(&ctx, &feature)?;
    Ok(Json(ApiResponse::success(FeatureCheck { feature, enabled: true })))
}
