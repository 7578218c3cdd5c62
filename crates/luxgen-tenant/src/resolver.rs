//! Tenant resolution
//!
//! Strategies are tried in a fixed order. The first candidate that matches
//! a tenant record wins; an unmatched candidate falls through to the next
//! strategy. The winning record is then checked for `is_active` and an
//! active subscription.

use crate::config::TenancyConfig;
use crate::directory::TenantDirectory;
use crate::error::{TenancyError, TenancyResult};
use crate::model::{SubscriptionStatus, Tenant};
use luxgen_common::{AuditEntry, AuditLog, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// How the tenant was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentificationMethod {
    /// First label of the request host
    Subdomain,
    /// Tenant-owned custom domain
    Domain,
    /// Tenant header
    Header,
    /// Tenant query parameter
    Query,
    /// Tenant claim on the authenticated principal
    Claim,
    /// Configured default tenant
    Default,
}

impl IdentificationMethod {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subdomain => "subdomain",
            Self::Domain => "domain",
            Self::Header => "header",
            Self::Query => "query",
            Self::Claim => "claim",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for IdentificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// User id
    pub user_id: String,
    /// Role name
    #[serde(default)]
    pub role: Option<String>,
    /// Tenant claim
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Request signals consumed by the resolver
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    /// Host header
    pub host: Option<String>,
    /// Headers, lowercase names
    pub headers: HashMap<String, String>,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Authenticated principal
    pub principal: Option<Principal>,
    /// Caller IP
    pub client_ip: Option<String>,
    /// Caller user agent
    pub user_agent: Option<String>,
}

impl RequestSignals {
    /// Empty signals
    pub fn new() -> Self {
        Self::default()
    }

    /// Set host
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Add header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Add query parameter
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    /// Set principal
    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Set caller IP
    pub fn client_ip(mut self, ip: &str) -> Self {
        self.client_ip = Some(ip.to_string());
        self
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        non_empty(self.headers.get(&name.to_ascii_lowercase()).map(String::as_str))
    }

    fn query_value(&self, name: &str) -> Option<&str> {
        non_empty(self.query.get(name).map(String::as_str))
    }
}

/// Successful resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Resolved tenant
    pub tenant: Arc<Tenant>,
    /// Winning strategy
    pub method: IdentificationMethod,
}

impl Resolution {
    /// Pair a tenant with the strategy that found it
    pub fn new(tenant: Arc<Tenant>, method: IdentificationMethod) -> Self {
        Self { tenant, method }
    }
}

/// Tenant resolver
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    config: Arc<TenancyConfig>,
    audit: AuditLog,
}

impl TenantResolver {
    /// Create resolver
    pub fn new(directory: Arc<dyn TenantDirectory>, config: Arc<TenancyConfig>, audit: AuditLog) -> Self {
        Self { directory, config, audit }
    }

    /// Resolve the tenant owning a request
    pub async fn resolve(&self, signals: &RequestSignals) -> TenancyResult<Resolution> {
        let candidate = match self.locate(signals).await {
            Ok(candidate) => candidate,
            Err(err) => {
                self.record_failure(signals, None, &err);
                return Err(err);
            }
        };
        if let Err(err) = self.admit(&candidate, signals) {
            self.record_failure(signals, Some(&candidate), &err);
            return Err(err);
        }
        self.record_success(signals, &candidate);
        Ok(candidate)
    }

    async fn locate(&self, signals: &RequestSignals) -> TenancyResult<Resolution> {
        let mut tried = Vec::new();
        let host = signals.host.as_deref().map(normalize_host);

        if let Some(host) = host.as_deref() {
            if let Some(slug) = self.subdomain_of(host) {
                if let Some(tenant) = self.directory.find_by_slug(slug).await? {
                    return Ok(Resolution::new(tenant, IdentificationMethod::Subdomain));
                }
                tried.push(IdentificationMethod::Subdomain);
            }
            if !is_local_or_ip(host) {
                if let Some(tenant) = self.directory.find_by_domain(host).await? {
                    return Ok(Resolution::new(tenant, IdentificationMethod::Domain));
                }
                tried.push(IdentificationMethod::Domain);
            }
        }

        if let Some(key) = signals.header_value(&self.config.tenant_header) {
            if let Some(tenant) = self.directory.find_by_id_or_slug(key).await? {
                return Ok(Resolution::new(tenant, IdentificationMethod::Header));
            }
            tried.push(IdentificationMethod::Header);
        }

        if let Some(slug) = signals.query_value(&self.config.tenant_query_param) {
            if let Some(tenant) = self.directory.find_by_slug(slug).await? {
                return Ok(Resolution::new(tenant, IdentificationMethod::Query));
            }
            tried.push(IdentificationMethod::Query);
        }

        let claim = signals.principal.as_ref().and_then(|p| non_empty(p.tenant_id.as_deref()));
        if let Some(key) = claim {
            if let Some(tenant) = self.directory.find_by_id_or_slug(key).await? {
                return Ok(Resolution::new(tenant, IdentificationMethod::Claim));
            }
            tried.push(IdentificationMethod::Claim);
        }

        if let Some(slug) = non_empty(self.config.default_tenant.as_deref()) {
            if let Some(tenant) = self.directory.find_by_slug(slug).await? {
                return Ok(Resolution::new(tenant, IdentificationMethod::Default));
            }
            tried.push(IdentificationMethod::Default);
        }

        let detail = if tried.is_empty() {
            "no tenant identifier in request".to_string()
        } else {
            let names: Vec<_> = tried.iter().map(IdentificationMethod::as_str).collect();
            format!("no tenant matched ({})", names.join(", "))
        };
        Err(TenancyError::TenantNotFound(detail))
    }

    fn admit(&self, candidate: &Resolution, signals: &RequestSignals) -> TenancyResult<()> {
        let tenant = &candidate.tenant;
        if !tenant.is_active {
            return Err(TenancyError::TenantInactive(tenant.slug.clone()));
        }
        if let Some(subscription) = &tenant.subscription {
            if subscription.status != SubscriptionStatus::Active {
                return Err(TenancyError::SubscriptionRequired(tenant.slug.clone()));
            }
        }
        // A token bound to one tenant never acts inside another
        let claim = signals.principal.as_ref().and_then(|p| non_empty(p.tenant_id.as_deref()));
        if let Some(claim) = claim {
            if claim != tenant.id.as_str() && !claim.eq_ignore_ascii_case(&tenant.slug) {
                return Err(TenancyError::TenantMismatch {
                    claimed: claim.to_string(),
                    resolved: tenant.slug.clone(),
                });
            }
        }
        Ok(())
    }

    fn subdomain_of<'a>(&self, host: &'a str) -> Option<&'a str> {
        if is_local_or_ip(host) {
            return None;
        }
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 3 {
            return None;
        }
        let first = labels[0];
        if first.is_empty() || self.config.is_reserved_subdomain(first) {
            return None;
        }
        Some(first)
    }

    fn audit_details(signals: &RequestSignals) -> serde_json::Value {
        json!({
            "host": signals.host,
            "ip": signals.client_ip,
            "userAgent": signals.user_agent,
        })
    }

    fn principal_id(signals: &RequestSignals) -> Option<String> {
        signals.principal.as_ref().map(|p| p.user_id.clone())
    }

    fn record_success(&self, signals: &RequestSignals, resolution: &Resolution) {
        tracing::debug!(
            tenant_id = %resolution.tenant.id,
            method = %resolution.method,
            "tenant resolved"
        );
        metrics::counter!(
            "luxgen_tenant_resolutions_total",
            "method" => resolution.method.as_str(),
            "outcome" => "ok"
        )
        .increment(1);

        let mut details = Self::audit_details(signals);
        details["method"] = json!(resolution.method);
        self.audit.record(
            AuditEntry::new("tenant_resolved", "tenant")
                .tenant(Some(resolution.tenant.id.clone()))
                .user(Self::principal_id(signals))
                .details(details),
        );
    }

    fn record_failure(&self, signals: &RequestSignals, candidate: Option<&Resolution>, err: &TenancyError) {
        let method = candidate.map_or("none", |c| c.method.as_str());
        tracing::warn!(
            code = err.code(),
            method,
            host = ?signals.host,
            "tenant resolution failed: {}",
            err
        );
        metrics::counter!(
            "luxgen_tenant_resolutions_total",
            "method" => method,
            "outcome" => err.code()
        )
        .increment(1);

        let mut details = Self::audit_details(signals);
        details["error"] = json!(err.code());
        if let Some(candidate) = candidate {
            details["method"] = json!(candidate.method);
        }
        self.audit.record(
            AuditEntry::new("tenant_resolution_failed", "tenant")
                .tenant(candidate.map(|c| c.tenant.id.clone()))
                .user(Self::principal_id(signals))
                .details(details),
        );
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Lowercase and strip any port
fn normalize_host(raw: &str) -> String {
    let host = raw.trim().to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    if host.matches(':').count() > 1 {
        // bare IPv6 literal
        return host;
    }
    host.split(':').next().unwrap_or_default().trim_end_matches('.').to_string()
}

fn is_local_or_ip(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost") || host.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryTenantDirectory;
    use crate::model::Tier;

    fn resolver_with(config: TenancyConfig) -> (TenantResolver, AuditLog) {
        let directory = InMemoryTenantDirectory::with_tenants([
            Tenant::new("acme", "acme", Tier::Enterprise),
            Tenant::new("demo-tenant", "demo-tenant", Tier::Standard),
            Tenant::new("globex-id", "globex", Tier::Premium).with_domain("careers.globex.com"),
            Tenant::new("luxgen", "luxgen", Tier::Enterprise)
                .with_subscription(SubscriptionStatus::Active),
            Tenant::new("dormant", "dormant", Tier::Free).deactivated(),
            Tenant::new("lapsed", "lapsed", Tier::Standard)
                .with_subscription(SubscriptionStatus::PastDue),
        ]);
        let audit = AuditLog::new();
        let resolver = TenantResolver::new(Arc::new(directory), Arc::new(config), audit.clone());
        (resolver, audit)
    }

    fn resolver() -> (TenantResolver, AuditLog) {
        resolver_with(TenancyConfig::default())
    }

    #[tokio::test]
    async fn test_subdomain_resolution() {
        let (resolver, _) = resolver();
        let signals = RequestSignals::new().host("acme.luxgen.example");
        let resolution = resolver.resolve(&signals).await.unwrap();

        assert_eq!(resolution.tenant.slug, "acme");
        assert_eq!(resolution.method, IdentificationMethod::Subdomain);
        assert_eq!(resolution.tenant.tier, Tier::Enterprise);
        assert!(resolution.tenant.has_feature("*"));
    }

    #[tokio::test]
    async fn test_localhost_skips_subdomain_and_uses_header() {
        let (resolver, _) = resolver();
        let signals = RequestSignals::new()
            .host("localhost:3000")
            .header("X-Tenant-Id", "demo-tenant");
        let resolution = resolver.resolve(&signals).await.unwrap();

        assert_eq!(resolution.tenant.id.as_str(), "demo-tenant");
        assert_eq!(resolution.method, IdentificationMethod::Header);
    }

    #[tokio::test]
    async fn test_subdomain_beats_header() {
        let (resolver, _) = resolver();
        let signals = RequestSignals::new()
            .host("acme.luxgen.example")
            .header("x-tenant-id", "demo-tenant")
            .query("tenant", "globex");
        let resolution = resolver.resolve(&signals).await.unwrap();
        assert_eq!(resolution.method, IdentificationMethod::Subdomain);
    }

    #[tokio::test]
    async fn test_reserved_subdomain_is_skipped() {
        let (resolver, _) = resolver();
        let signals = RequestSignals::new()
            .host("www.luxgen.example")
            .query("tenant", "globex");
        let resolution = resolver.resolve(&signals).await.unwrap();
        assert_eq!(resolution.tenant.slug, "globex");
        assert_eq!(resolution.method, IdentificationMethod::Query);
    }

    #[tokio::test]
    async fn test_custom_domain_after_unmatched_subdomain() {
        let (resolver, _) = resolver();
        let signals = RequestSignals::new().host("careers.globex.com");
        let resolution = resolver.resolve(&signals).await.unwrap();
        assert_eq!(resolution.tenant.id.as_str(), "globex-id");
        assert_eq!(resolution.method, IdentificationMethod::Domain);
    }

    #[tokio::test]
    async fn test_claim_then_default() {
        let config = TenancyConfig {
            default_tenant: Some("luxgen".into()),
            ..TenancyConfig::default()
        };
        let (resolver, _) = resolver_with(config);

        let claim = RequestSignals::new().host("127.0.0.1").principal(Principal {
            user_id: "u1".into(),
            role: None,
            tenant_id: Some("globex-id".into()),
        });
        let resolution = resolver.resolve(&claim).await.unwrap();
        assert_eq!(resolution.method, IdentificationMethod::Claim);

        let bare = RequestSignals::new().host("localhost");
        let resolution = resolver.resolve(&bare).await.unwrap();
        assert_eq!(resolution.tenant.slug, "luxgen");
        assert_eq!(resolution.method, IdentificationMethod::Default);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (resolver, audit) = resolver();

        let inactive = resolver.resolve(&RequestSignals::new().header("x-tenant-id", "dormant")).await;
        assert!(matches!(inactive, Err(TenancyError::TenantInactive(_))));

        let lapsed = resolver.resolve(&RequestSignals::new().query("tenant", "lapsed")).await;
        assert!(matches!(lapsed, Err(TenancyError::SubscriptionRequired(_))));

        let unknown = resolver.resolve(&RequestSignals::new().header("x-tenant-id", "nobody")).await;
        let err = unknown.unwrap_err();
        assert_eq!(err.status_code(), 404);

        let nothing = resolver.resolve(&RequestSignals::new()).await;
        assert!(matches!(nothing, Err(TenancyError::TenantNotFound(_))));

        let entries = audit.entries();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.action == "tenant_resolution_failed"));

        // found but rejected: the matched tenant and strategy are kept
        assert_eq!(entries[0].tenant_id.as_ref().map(|t| t.as_str()), Some("dormant"));
        assert_eq!(entries[0].details["method"], "header");
        assert_eq!(entries[0].details["error"], "TENANT_INACTIVE");
        assert_eq!(entries[1].tenant_id.as_ref().map(|t| t.as_str()), Some("lapsed"));
        assert_eq!(entries[1].details["method"], "query");

        // nothing matched
        assert!(entries[2].tenant_id.is_none());
        assert!(entries[2].details.get("method").is_none());
    }

    #[tokio::test]
    async fn test_claim_must_match_resolved_tenant() {
        let (resolver, audit) = resolver();
        let acme_user = Principal {
            user_id: "acme-user".into(),
            role: None,
            tenant_id: Some("acme".into()),
        };

        let crossing = RequestSignals::new()
            .host("localhost")
            .header("x-tenant-id", "demo-tenant")
            .principal(acme_user.clone());
        let err = resolver.resolve(&crossing).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantMismatch { .. }));
        assert_eq!(err.status_code(), 403);

        let entries = audit.entries();
        assert_eq!(entries[0].details["error"], "TENANT_MISMATCH");
        assert_eq!(entries[0].tenant_id.as_ref().map(|t| t.as_str()), Some("demo-tenant"));
        assert_eq!(entries[0].user_id.as_deref(), Some("acme-user"));

        // header naming the claimed tenant by slug is accepted
        let own = RequestSignals::new()
            .host("localhost")
            .header("x-tenant-id", "ACME")
            .principal(acme_user);
        let resolution = resolver.resolve(&own).await.unwrap();
        assert_eq!(resolution.tenant.slug, "acme");
        assert_eq!(resolution.method, IdentificationMethod::Header);
    }

    #[tokio::test]
    async fn test_every_resolution_is_audited() {
        let (resolver, audit) = resolver();
        let signals = RequestSignals::new().host("acme.luxgen.example").client_ip("10.0.0.7");
        resolver.resolve(&signals).await.unwrap();

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "tenant_resolved");
        assert_eq!(entries[0].details["method"], "subdomain");
        assert_eq!(entries[0].details["ip"], "10.0.0.7");
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Acme.LuxGen.Example:8443"), "acme.luxgen.example");
        assert_eq!(normalize_host("[::1]:3000"), "::1");
        assert!(is_local_or_ip(&normalize_host("[::1]:3000")));
        assert!(is_local_or_ip("localhost"));
        assert!(is_local_or_ip("192.168.1.10"));
    }
}
