//! Tenant Entitlements and Feature Gating

use crate::error::{TenancyError, TenancyResult};
use crate::model::{Tenant, ALL_FEATURES};
use std::collections::BTreeSet;

/// Deny unless the tier allow-list, a wildcard, or an add-on grants `feature`
pub fn check_feature_access(tenant: &Tenant, feature: &str) -> TenancyResult<()> {
    if tenant.has_feature(feature) {
        Ok(())
    } else {
        tracing::debug!(tenant_id = %tenant.id, feature, tier = tenant.tier.as_str(), "feature denied");
        Err(TenancyError::FeatureNotAvailable(feature.to_string()))
    }
}

/// Effective feature tags; `["*"]` when everything is granted
pub fn effective_features(tenant: &Tenant) -> BTreeSet<String> {
    let mut features: BTreeSet<String> = tenant.tier.features().iter().map(|f| f.to_string()).collect();
    features.extend(tenant.features.iter().cloned());
    if features.contains(ALL_FEATURES) {
        return BTreeSet::from([ALL_FEATURES.to_string()]);
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use luxgen_common::ErrorCode;

    #[test]
    fn test_free_tier_gating() {
        let tenant = Tenant::new("t1", "t1", Tier::Free);
        assert!(check_feature_access(&tenant, "basic_workflows").is_ok());

        let err = check_feature_access(&tenant, "sso").unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), "FEATURE_NOT_AVAILABLE");
    }

    #[test]
    fn test_enterprise_has_everything() {
        let tenant = Tenant::new("acme", "acme", Tier::Enterprise);
        for feature in ["*", "sso", "advanced_workflows", "not_invented_yet"] {
            assert!(check_feature_access(&tenant, feature).is_ok());
        }
        assert_eq!(effective_features(&tenant), BTreeSet::from(["*".to_string()]));
    }

    #[test]
    fn test_effective_features_merge_addons() {
        let tenant = Tenant::new("t1", "t1", Tier::Standard).with_feature("sso");
        let features = effective_features(&tenant);
        assert!(features.contains("analytics"));
        assert!(features.contains("sso"));
        assert!(!features.contains("api_access"));
    }
}
