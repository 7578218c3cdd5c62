//! Bearer token authentication
//!
//! A valid token attaches a [`Principal`] to the request. Requests without
//! an `Authorization` header pass through anonymously; a malformed or
//! invalid token is rejected.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use luxgen_tenant::Principal;

/// Verify the bearer token, if any
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;
        let principal: Principal = state.auth.verify(token)?;
        tracing::debug!(user_id = %principal.user_id, "request authenticated");
        req.extensions_mut().insert(principal);
    }
    Ok(next.run(req).await)
}
