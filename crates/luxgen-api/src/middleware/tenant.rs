//! Tenant resolution and isolation
//!
//! Resolves the owning tenant from the request and attaches the isolated
//! [`TenantContext`]. Resolution and isolation failures short-circuit
//! before any handler runs.

use super::client_ip;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use luxgen_tenant::{Principal, RequestSignals};
use std::collections::HashMap;

/// Headers never copied into resolution signals
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie"];

/// Resolve and isolate the tenant for this request
pub async fn resolve_tenant(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let signals = signals_from(&req);
    let resolution = state.resolver.resolve(&signals).await?;
    let tenant = state.isolation.isolate(&resolution).await?;

    req.extensions_mut().insert(tenant);
    req.extensions_mut().insert(resolution);
    Ok(next.run(req).await)
}

/// Collect resolution signals from a request
pub fn signals_from(req: &Request) -> RequestSignals {
    let mut signals = RequestSignals::new();

    signals.host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()));

    for (name, value) in req.headers() {
        if SENSITIVE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            signals.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        signals.query = query;
    }

    signals.principal = req.extensions().get::<Principal>().cloned();
    signals.client_ip = client_ip(req);
    signals.user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_signals_from_request() {
        let mut req = axum::http::Request::builder()
            .uri("/api/v1/tenant?tenant=acme&x=1")
            .header("Host", "acme.luxgen.example:8080")
            .header("X-Tenant-Id", "demo-tenant")
            .header("Authorization", "Bearer secret")
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .header("User-Agent", "curl/8")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(Principal { user_id: "u1".into(), role: None, tenant_id: Some("acme".into()) });

        let signals = signals_from(&req);
        assert_eq!(signals.host.as_deref(), Some("acme.luxgen.example:8080"));
        assert_eq!(signals.headers.get("x-tenant-id").map(String::as_str), Some("demo-tenant"));
        assert!(!signals.headers.contains_key("authorization"));
        assert_eq!(signals.query.get("tenant").map(String::as_str), Some("acme"));
        assert_eq!(signals.client_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(signals.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(signals.principal.unwrap().tenant_id.as_deref(), Some("acme"));
    }
}
