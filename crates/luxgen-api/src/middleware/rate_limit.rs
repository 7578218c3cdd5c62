//! Tier-aware rate limiting and usage tracking

use super::client_identity;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use luxgen_tenant::{TenancyError, TenantContext};

/// Count the request against the `(client, tenant)` window
pub async fn enforce_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or(TenancyError::TenantContextMissing)?;
    let client = client_identity(&req);

    let decision = state.isolation.check_rate_limit(&tenant, &client).map_err(|err| {
        metrics::counter!("luxgen_http_rate_limited_total", "tier" => tenant.tenant().tier.as_str()).increment(1);
        err
    })?;
    state.isolation.track_usage(&tenant, &client);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    Ok(response)
}
