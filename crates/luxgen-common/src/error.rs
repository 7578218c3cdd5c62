//! Error contract shared by every LuxGen layer

use serde::{Deserialize, Serialize};

/// Machine-readable error metadata
///
/// Implemented by the tenancy and workflow error enums so the HTTP layer can
/// render any rejection without knowing where it came from.
pub trait ErrorCode: std::error::Error {
    /// Stable upper-snake-case code, e.g. `TENANT_NOT_FOUND`
    fn code(&self) -> &'static str;

    /// HTTP-equivalent status code
    fn status_code(&self) -> u16;

    /// Serializable body for this error
    fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}
