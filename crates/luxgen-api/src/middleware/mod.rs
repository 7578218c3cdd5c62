//! Request middleware
//!
//! Applied outermost first: `auth` → `tenant` → `rate_limit`.

pub mod auth;
pub mod rate_limit;
pub mod tenant;

use axum::extract::Request;
use luxgen_tenant::Principal;

/// Header carrying an upstream request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// First address in `X-Forwarded-For`, or `X-Real-IP`
pub(crate) fn client_ip(req: &Request) -> Option<String> {
    let headers = req.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Identity used for rate limiting and caller tracking
pub(crate) fn client_identity(req: &Request) -> String {
    if let Some(principal) = req.extensions().get::<Principal>() {
        return format!("user:{}", principal.user_id);
    }
    match client_ip(req) {
        Some(ip) => format!("ip:{}", ip),
        None => "anonymous".to_string(),
    }
}
