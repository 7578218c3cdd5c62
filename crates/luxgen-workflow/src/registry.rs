//! Workflow registry
//!
//! Definitions are registered under their id, or under
//! `{tenantId}_{workflowId}` when registered for one tenant. Lookups for
//! a tenant try the qualified key first, so a tenant override shadows the
//! shared definition for that tenant only.

use crate::definition::{ErrorHandling, MergeStrategy, StepType, WorkflowDefinition};
use crate::error::{EngineResult, WorkflowError};
use crate::graph::ExecutionPlan;
use luxgen_common::TenantId;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry key for a tenant-specific definition
pub fn qualified_id(tenant_id: &TenantId, workflow_id: &str) -> String {
    format!("{}_{}", tenant_id, workflow_id)
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    /// Workflow id
    pub id: String,
    /// Version
    pub version: String,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Number of steps
    pub steps: usize,
    /// Registered per tenant
    pub tenant_specific: bool,
    /// Open to tenants outside the bound set
    pub cross_tenant_allowed: bool,
    /// Required feature tag
    pub required_feature: Option<String>,
    /// This tenant has its own override
    pub tenant_override: bool,
}

impl WorkflowSummary {
    fn of(definition: &WorkflowDefinition, tenant_override: bool) -> Self {
        Self {
            id: definition.id.clone(),
            version: definition.version.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            steps: definition.steps.len(),
            tenant_specific: definition.tenant_specific,
            cross_tenant_allowed: definition.cross_tenant_allowed,
            required_feature: definition.required_feature.clone(),
            tenant_override,
        }
    }
}

/// Step documentation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDoc {
    /// Step id
    pub id: String,
    /// Category
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Dependencies
    pub dependencies: Vec<String>,
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Retryable
    pub retryable: bool,
    /// Critical
    pub critical: bool,
    /// Output merge
    pub merge: MergeStrategy,
}

/// Workflow documentation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocumentation {
    /// Workflow id
    pub id: String,
    /// Version
    pub version: String,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Registered per tenant
    pub tenant_specific: bool,
    /// Open to other tenants
    pub cross_tenant_allowed: bool,
    /// Required feature tag
    pub required_feature: Option<String>,
    /// Steps in declaration order
    pub steps: Vec<StepDoc>,
    /// Steps grouped by dependency depth
    pub execution_order: Vec<Vec<String>>,
    /// Error handling policy
    pub error_handling: ErrorHandling,
    /// Expected input
    pub input_schema: Value,
}

/// Registry health
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    /// Always `healthy` while the registry is reachable
    pub status: &'static str,
    /// Registered definitions, overrides included
    pub registered: usize,
    /// Registry keys
    pub workflows: Vec<String>,
}

/// Workflow registry
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared definition
    pub fn register(&self, definition: WorkflowDefinition) -> EngineResult<Arc<WorkflowDefinition>> {
        let key = definition.id.clone();
        self.insert(key, definition)
    }

    /// Register a definition for one tenant, overriding any shared one
    pub fn register_for_tenant(
        &self,
        tenant_id: &TenantId,
        definition: WorkflowDefinition,
    ) -> EngineResult<Arc<WorkflowDefinition>> {
        let definition = definition.bind_to(tenant_id.clone());
        let key = qualified_id(tenant_id, &definition.id);
        self.insert(key, definition)
    }

    fn insert(&self, key: String, definition: WorkflowDefinition) -> EngineResult<Arc<WorkflowDefinition>> {
        ExecutionPlan::for_definition(&definition)?;

        let definition = Arc::new(definition);
        let previous = self.workflows.write().insert(key.clone(), Arc::clone(&definition));
        match previous {
            Some(old) => tracing::info!(
                key = %key,
                from = %old.version,
                to = %definition.version,
                "workflow definition replaced"
            ),
            None => tracing::info!(key = %key, version = %definition.version, "workflow registered"),
        }
        Ok(definition)
    }

    /// Remove a definition by registry key
    pub fn unregister(&self, key: &str) -> bool {
        self.workflows.write().remove(key).is_some()
    }

    /// Find a definition, preferring the tenant's override
    pub fn resolve(&self, workflow_id: &str, tenant_id: Option<&TenantId>) -> EngineResult<Arc<WorkflowDefinition>> {
        let workflows = self.workflows.read();
        tenant_id
            .and_then(|t| workflows.get(&qualified_id(t, workflow_id)))
            .or_else(|| workflows.get(workflow_id))
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Reject tenants outside a definition's bound set
    pub fn authorize(&self, definition: &WorkflowDefinition, tenant_id: &TenantId) -> EngineResult<()> {
        if definition.permits(tenant_id) {
            Ok(())
        } else {
            Err(WorkflowError::PolicyViolation {
                workflow: definition.id.clone(),
                tenant: tenant_id.to_string(),
            })
        }
    }

    /// Resolve and authorize for a tenant
    pub fn resolve_for(&self, workflow_id: &str, tenant_id: &TenantId) -> EngineResult<Arc<WorkflowDefinition>> {
        let definition = self.resolve(workflow_id, Some(tenant_id))?;
        self.authorize(&definition, tenant_id)?;
        Ok(definition)
    }

    /// Definitions a tenant can run, or every shared definition
    pub fn list_available(&self, tenant_id: Option<&TenantId>) -> Vec<WorkflowSummary> {
        let workflows = self.workflows.read();
        let mut summaries: Vec<WorkflowSummary> = match tenant_id {
            None => workflows
                .iter()
                .filter(|(key, def)| key.as_str() == def.id)
                .map(|(_, def)| WorkflowSummary::of(def, false))
                .collect(),
            Some(tenant_id) => {
                let mut visible: HashMap<&str, WorkflowSummary> = HashMap::new();
                for (key, def) in workflows.iter() {
                    if *key == qualified_id(tenant_id, &def.id) && def.bound_tenants.contains(tenant_id) {
                        visible.insert(def.id.as_str(), WorkflowSummary::of(def, true));
                    } else if key.as_str() == def.id && def.permits(tenant_id) {
                        visible.entry(def.id.as_str()).or_insert_with(|| WorkflowSummary::of(def, false));
                    }
                }
                visible.into_values().collect()
            }
        };
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Ids of the workflows a tenant can run
    pub fn tenant_workflows(&self, tenant_id: &TenantId) -> Vec<String> {
        self.list_available(Some(tenant_id)).into_iter().map(|s| s.id).collect()
    }

    /// Step graph and policy of a definition
    pub fn documentation(&self, workflow_id: &str, tenant_id: Option<&TenantId>) -> EngineResult<WorkflowDocumentation> {
        let definition = self.resolve(workflow_id, tenant_id)?;
        if let Some(tenant_id) = tenant_id {
            self.authorize(&definition, tenant_id)?;
        }
        let plan = ExecutionPlan::for_definition(&definition)?;

        Ok(WorkflowDocumentation {
            id: definition.id.clone(),
            version: definition.version.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            tenant_specific: definition.tenant_specific,
            cross_tenant_allowed: definition.cross_tenant_allowed,
            required_feature: definition.required_feature.clone(),
            steps: definition
                .steps
                .iter()
                .map(|s| StepDoc {
                    id: s.id.clone(),
                    step_type: s.step_type,
                    dependencies: s.dependencies.clone(),
                    timeout_ms: s.timeout.as_millis() as u64,
                    retryable: s.retryable,
                    critical: s.critical,
                    merge: s.merge.clone(),
                })
                .collect(),
            execution_order: plan.levels,
            error_handling: definition.error_handling.clone(),
            input_schema: definition.input_schema.clone(),
        })
    }

    /// Registry health
    pub fn health(&self) -> RegistryHealth {
        let mut workflows: Vec<String> = self.workflows.read().keys().cloned().collect();
        workflows.sort();
        RegistryHealth { status: "healthy", registered: workflows.len(), workflows }
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{step_fn, WorkflowStep};
    use serde_json::json;

    fn definition(id: &str, version: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, version, id).step(WorkflowStep::new(
            "only",
            StepType::BusinessLogic,
            step_fn(|_ctx| async { Ok(json!({})) }),
        ))
    }

    #[test]
    fn test_tenant_override_precedence() {
        let registry = WorkflowRegistry::new();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");

        registry.register(definition("onboarding", "1.0.0")).unwrap();
        registry.register_for_tenant(&acme, definition("onboarding", "2.0.0")).unwrap();

        assert_eq!(registry.resolve("onboarding", Some(&acme)).unwrap().version, "2.0.0");
        assert_eq!(registry.resolve("onboarding", Some(&globex)).unwrap().version, "1.0.0");
        assert_eq!(registry.resolve("onboarding", None).unwrap().version, "1.0.0");
        assert!(registry.resolve_for("onboarding", &globex).is_ok());
    }

    #[test]
    fn test_cross_tenant_policy() {
        let registry = WorkflowRegistry::new();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");
        registry.register_for_tenant(&acme, definition("payroll", "1.0.0")).unwrap();

        let key = qualified_id(&acme, "payroll");
        assert!(registry.resolve_for(&key, &acme).is_ok());
        match registry.resolve_for(&key, &globex) {
            Err(WorkflowError::PolicyViolation { tenant, .. }) => assert_eq!(tenant, "globex"),
            other => panic!("expected policy violation, got {:?}", other.map(|d| d.id.clone())),
        }
        assert!(matches!(
            registry.resolve_for("payroll", &globex),
            Err(WorkflowError::WorkflowNotFound(_))
        ));
    }

    #[test]
    fn test_cycle_rejected_at_registration() {
        let registry = WorkflowRegistry::new();
        let noop = || step_fn(|_ctx| async { Ok(json!({})) });
        let cyclic = WorkflowDefinition::new("loop", "1.0.0", "Loop")
            .step(WorkflowStep::new("a", StepType::BusinessLogic, noop()).depends_on(&["b"]))
            .step(WorkflowStep::new("b", StepType::BusinessLogic, noop()).depends_on(&["a"]));

        assert!(matches!(registry.register(cyclic), Err(WorkflowError::CyclicDependency { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listing_per_tenant() {
        let registry = WorkflowRegistry::new();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");
        registry.register(definition("shared", "1.0.0")).unwrap();
        registry.register(definition("onboarding", "1.0.0")).unwrap();
        registry.register_for_tenant(&acme, definition("onboarding", "2.0.0")).unwrap();
        registry.register_for_tenant(&acme, definition("private", "1.0.0")).unwrap();

        let acme_list = registry.list_available(Some(&acme));
        let ids: Vec<&str> = acme_list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["onboarding", "private", "shared"]);
        assert!(acme_list[0].tenant_override);
        assert_eq!(acme_list[0].version, "2.0.0");

        assert_eq!(registry.tenant_workflows(&globex), vec!["onboarding", "shared"]);
        assert_eq!(registry.list_available(None).len(), 2);
        assert_eq!(registry.health().registered, 4);
    }

    #[test]
    fn test_documentation() {
        let registry = WorkflowRegistry::new();
        registry.register(definition("docs", "1.2.0").description("Documented")).unwrap();

        let docs = registry.documentation("docs", None).unwrap();
        assert_eq!(docs.version, "1.2.0");
        assert_eq!(docs.steps.len(), 1);
        assert_eq!(docs.execution_order, vec![vec!["only".to_string()]]);

        let json = serde_json::to_value(&docs).unwrap();
        assert_eq!(json["steps"][0]["type"], "business_logic");
        assert_eq!(json["errorHandling"]["maxRetries"], 3);

        assert!(matches!(registry.documentation("nope", None), Err(WorkflowError::WorkflowNotFound(_))));
    }
}
