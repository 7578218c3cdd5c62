//! API error envelope

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use luxgen_common::{ErrorBody, ErrorCode};
use luxgen_tenant::TenancyError;
use luxgen_workflow::WorkflowError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by handlers and middleware
#[derive(Debug, Error)]
pub enum ApiError {
    /// Tenancy rejection
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    /// Workflow rejection
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Missing or invalid credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Malformed request
    #[error("{0}")]
    BadRequest(String),

    /// Unexpected failure; the message is never shown to the caller
    #[error("internal error")]
    Internal(String),
}

impl ErrorCode for ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Tenancy(err) => err.code(),
            Self::Workflow(err) => err.code(),
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::Tenancy(err) => err.status_code(),
            Self::Workflow(err) => err.status_code(),
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Always false
    pub success: bool,
    /// Code and message
    pub error: ErrorBody,
    /// HTTP status
    pub status_code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }

        let body = ErrorEnvelope { success: false, error: self.to_body(), status_code: status.as_u16() };
        let mut response = (status, Json(body)).into_response();

        if let Self::Tenancy(TenancyError::RateLimited { retry_after }) = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Handler result
pub type ApiResult<T> = Result<T, ApiError>;
