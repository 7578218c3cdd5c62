//! LuxGen Common - Shared primitives for the multi-tenant platform
//!
//! This crate provides the pieces both the tenancy layer and the workflow
//! engine lean on:
//! - Tenant identity ([`TenantId`])
//! - Append-only audit logging ([`AuditLog`], [`AuditEntry`])
//! - The machine-readable error contract ([`ErrorCode`], [`ErrorBody`])
//! - Backoff policies and the shared retry executor ([`retry`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod error;
pub mod retry;

pub use audit::{AuditEntry, AuditLog};
pub use error::{ErrorBody, ErrorCode};
pub use retry::{Backoff, BackoffPolicy, RetryOutcome, Retryable};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant identifier
///
/// Every piece of tenant data, quota counter and cached handle is keyed by
/// this value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
