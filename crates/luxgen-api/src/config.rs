//! Platform configuration
//!
//! Loaded from an optional TOML file (`LUXGEN_CONFIG`, default
//! `luxgen.toml`) overlaid with `LUXGEN__SECTION__KEY` environment
//! variables.

use luxgen_tenant::{Subscription, SubscriptionStatus, TenancyConfig, Tenant, Tier};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "LUXGEN_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// HTTP server
    pub server: ServerConfig,
    /// Token validation
    pub auth: AuthConfig,
    /// Tenant resolution and isolation
    pub tenancy: TenancyConfig,
    /// Workflow engine housekeeping
    pub workflows: WorkflowsConfig,
    /// Tenants loaded into the in-memory directory at startup
    pub tenants: Vec<Tenant>,
}

/// HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:8080".to_string() }
    }
}

/// Token validation
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens
    pub jwt_secret: String,
    /// Expected `iss` claim
    pub jwt_issuer: Option<String>,
    /// Lifetime of issued tokens
    pub token_ttl_secs: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "luxgen-dev-secret-change-in-production".to_string(),
            jwt_issuer: Some("luxgen".to_string()),
            token_ttl_secs: 8 * 3600,
        }
    }
}

/// Workflow engine housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// How long finished executions are kept
    pub execution_retention_secs: u64,
    /// How often the cleanup task runs
    pub cleanup_interval_secs: u64,
}

impl WorkflowsConfig {
    /// Retention as a duration
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.execution_retention_secs)
    }

    /// Cleanup interval as a duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self { execution_retention_secs: 86_400, cleanup_interval_secs: 3_600 }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            tenancy: TenancyConfig::default(),
            workflows: WorkflowsConfig::default(),
            tenants: default_tenants(),
        }
    }
}

impl PlatformConfig {
    /// Load from an optional file overlaid with environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| "luxgen.toml".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("LUXGEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

fn default_tenants() -> Vec<Tenant> {
    let active = |tenant: Tenant| Tenant {
        subscription: Some(Subscription { status: SubscriptionStatus::Active, plan: Some(tenant.tier.as_str().to_string()) }),
        ..tenant
    };
    vec![
        active(Tenant { name: "LuxGen".to_string(), ..Tenant::new("luxgen", "luxgen", Tier::Enterprise) }),
        active(Tenant { name: "Acme Corp".to_string(), ..Tenant::new("acme", "acme", Tier::Enterprise) }),
        Tenant { name: "Demo Tenant".to_string(), ..Tenant::new("demo-tenant", "demo-tenant", Tier::Standard) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlatformConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.tenancy.tenant_header, "x-tenant-id");
        assert_eq!(config.workflows.retention(), Duration::from_secs(86_400));
        assert_eq!(config.tenants.len(), 3);
        assert!(!format!("{:?}", config.auth).contains("change-in-production"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = PlatformConfig::load(Some("/nonexistent/luxgen-test")).unwrap();
        assert_eq!(config.tenancy.db_prefix, "luxgen_tenant_");
        assert_eq!(config.workflows.cleanup_interval(), Duration::from_secs(3_600));
    }
}
