//! JWT authentication

use crate::config::AuthConfig;
use crate::error::ApiError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use luxgen_tenant::Principal;
use serde::{Deserialize, Serialize};

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Tenant claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry, seconds since epoch
    pub exp: usize,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal { user_id: claims.sub, role: claims.role, tenant_id: claims.tenant_id }
    }
}

/// Issues and verifies HS256 tokens
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    ttl_secs: u64,
}

impl JwtAuth {
    /// Build from configuration
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            ttl_secs: config.token_ttl_secs,
        }
    }

    /// Issue a token
    pub fn issue(&self, user_id: &str, tenant_id: Option<&str>, role: Option<&str>) -> Result<String, ApiError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + self.ttl_secs;
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            role: role.map(str::to_string),
            iss: self.issuer.clone(),
            exp: exp as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| ApiError::Internal(format!("token encoding failed: {}", err)))
    }

    /// Verify a bearer token
    pub fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                ApiError::Unauthorized("invalid or expired token".to_string())
            })
    }
}
