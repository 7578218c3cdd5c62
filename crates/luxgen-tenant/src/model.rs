//! Tenant Data Model

use luxgen_common::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Wildcard feature tag granting every feature
pub const ALL_FEATURES: &str = "*";

/// Tenant definition
///
/// Read-only to the platform core; created and updated out of band by the
/// tenant management collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Unique tenant ID
    pub id: TenantId,
    /// URL-safe slug, used for subdomains
    pub slug: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Custom domains owned by the tenant
    #[serde(default)]
    pub domains: Vec<String>,
    /// Inactive tenants are rejected before isolation
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Subscription tier
    pub tier: Tier,
    /// Add-on feature tags on top of the tier allow-list
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Billing subscription, if the tenant has one
    #[serde(default)]
    pub subscription: Option<Subscription>,
    /// Opaque tenant settings handed to workflows
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl Tenant {
    /// Create active tenant with no add-ons
    pub fn new(id: impl Into<TenantId>, slug: &str, tier: Tier) -> Self {
        Self {
            id: id.into(),
            slug: slug.to_lowercase(),
            name: slug.to_string(),
            domains: Vec::new(),
            is_active: true,
            tier,
            features: BTreeSet::new(),
            subscription: None,
            settings: serde_json::Value::Null,
        }
    }

    /// Add a custom domain
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domains.push(domain.to_lowercase());
        self
    }

    /// Add an add-on feature
    pub fn with_feature(mut self, feature: &str) -> Self {
        self.features.insert(feature.to_string());
        self
    }

    /// Attach a subscription
    pub fn with_subscription(mut self, status: SubscriptionStatus) -> Self {
        self.subscription = Some(Subscription { status, plan: None });
        self
    }

    /// Mark inactive
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Check if feature is enabled for this tenant
    pub fn has_feature(&self, feature: &str) -> bool {
        let tier = self.tier.features();
        tier.contains(&ALL_FEATURES)
            || tier.contains(&feature)
            || self.features.contains(ALL_FEATURES)
            || self.features.contains(feature)
    }
}

fn default_true() -> bool {
    true
}

/// Tenant tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free
    Free,
    /// Standard
    Standard,
    /// Premium
    Premium,
    /// Enterprise
    Enterprise,
}

impl Tier {
    /// All tiers, lowest first
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Standard, Tier::Premium, Tier::Enterprise];

    /// Feature allow-list for tier
    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Self::Free => &["basic_workflows"],
            Self::Standard => &["basic_workflows", "custom_branding", "analytics"],
            Self::Premium => &[
                "basic_workflows", "custom_branding", "analytics",
                "api_access", "advanced_workflows", "sso",
            ],
            Self::Enterprise => &[ALL_FEATURES],
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Billing subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Current status
    pub status: SubscriptionStatus,
    /// Plan name
    #[serde(default)]
    pub plan: Option<String>,
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current
    Active,
    /// Trial period
    Trialing,
    /// Payment overdue
    PastDue,
    /// Cancelled by the tenant
    Cancelled,
    /// Lapsed
    Expired,
}

/// One value per tier, looked up exhaustively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable<T> {
    /// Free tier value
    pub free: T,
    /// Standard tier value
    pub standard: T,
    /// Premium tier value
    pub premium: T,
    /// Enterprise tier value
    pub enterprise: T,
}

impl<T> TierTable<T> {
    /// Value for tier
    pub fn get(&self, tier: Tier) -> &T {
        match tier {
            Tier::Free => &self.free,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
            Tier::Enterprise => &self.enterprise,
        }
    }
}
