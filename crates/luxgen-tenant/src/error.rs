//! Tenancy errors

use crate::limits::{Limit, QuotaResource};
use luxgen_common::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Result alias
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors raised while resolving or isolating a tenant
#[derive(Debug, Error)]
pub enum TenancyError {
    /// No tenant matched the request
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Tenant exists but is disabled
    #[error("tenant {0} is inactive")]
    TenantInactive(String),

    /// Tenant subscription is not active
    #[error("tenant {0} requires an active subscription")]
    SubscriptionRequired(String),

    /// Principal's tenant claim names a different tenant
    #[error("credentials for tenant {claimed} cannot act on tenant {resolved}")]
    TenantMismatch {
        /// Tenant named by the token
        claimed: String,
        /// Tenant the request resolved to
        resolved: String,
    },

    /// Isolation was requested without a resolved tenant
    #[error("no tenant context for this request")]
    TenantContextMissing,

    /// Usage at or above quota
    #[error("quota exceeded for {resource}: limit {limit}, usage {usage}")]
    QuotaExceeded {
        /// Resource
        resource: QuotaResource,
        /// Configured limit
        limit: Limit,
        /// Usage at time of check
        usage: u64,
    },

    /// Tier does not include the feature
    #[error("feature '{0}' is not available on this plan")]
    FeatureNotAvailable(String),

    /// Too many requests in the current window
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the window resets
        retry_after: Duration,
    },

    /// Tenant resource handle could not be created
    #[error("tenant resources unavailable")]
    HandleUnavailable(String),

    /// Directory backend failure
    #[error("tenant directory unavailable")]
    Directory(String),
}

impl ErrorCode for TenancyError {
    fn code(&self) -> &'static str {
        match self {
            Self::TenantNotFound(_) => "TENANT_NOT_FOUND",
            Self::TenantInactive(_) => "TENANT_INACTIVE",
            Self::SubscriptionRequired(_) => "SUBSCRIPTION_REQUIRED",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::TenantContextMissing => "TENANT_CONTEXT_MISSING",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::FeatureNotAvailable(_) => "FEATURE_NOT_AVAILABLE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::HandleUnavailable(_) => "TENANT_RESOURCES_UNAVAILABLE",
            Self::Directory(_) => "TENANT_DIRECTORY_UNAVAILABLE",
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::TenantNotFound(_) => 404,
            Self::TenantInactive(_) | Self::SubscriptionRequired(_) => 403,
            Self::TenantMismatch { .. } | Self::FeatureNotAvailable(_) => 403,
            Self::TenantContextMissing => 400,
            Self::QuotaExceeded { .. } | Self::RateLimited { .. } => 429,
            Self::HandleUnavailable(_) | Self::Directory(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TenancyError::TenantNotFound("x".into()).status_code(), 404);
        assert_eq!(TenancyError::TenantInactive("x".into()).status_code(), 403);
        assert_eq!(TenancyError::SubscriptionRequired("x".into()).status_code(), 403);
        let quota = TenancyError::QuotaExceeded {
            resource: QuotaResource::Users,
            limit: Limit::Max(10),
            usage: 10,
        };
        assert_eq!(quota.status_code(), 429);
        assert_eq!(quota.code(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_internal_detail_not_in_message() {
        let err = TenancyError::HandleUnavailable("mongodb://secret@db/luxgen_tenant_acme".into());
        assert!(!err.to_string().contains("secret"));
    }
}
