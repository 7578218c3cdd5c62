//! Step dependency graph
//!
//! Validates a definition's steps and computes a topological plan with
//! Kahn's algorithm. Any step left with unmet dependencies after the
//! sort is part of (or downstream of) a cycle.

use crate::definition::{WorkflowDefinition, WorkflowStep};
use crate::error::{EngineResult, WorkflowError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Validated execution plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Topological order
    pub order: Vec<String>,
    /// Steps grouped by depth; each level only depends on earlier ones
    pub levels: Vec<Vec<String>>,
    /// step id → steps that depend on it
    pub dependents: HashMap<String, Vec<String>>,
    /// step id → number of distinct dependencies
    pub in_degree: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Build a plan for a definition
    pub fn for_definition(definition: &WorkflowDefinition) -> EngineResult<Self> {
        Self::build(&definition.id, &definition.steps)
    }

    /// Validate steps and compute the plan
    pub fn build(workflow_id: &str, steps: &[Arc<WorkflowStep>]) -> EngineResult<Self> {
        let mut ids = HashSet::with_capacity(steps.len());
        for step in steps {
            if !ids.insert(step.id.as_str()) {
                return Err(WorkflowError::DuplicateStep(step.id.clone()));
            }
        }

        let mut in_degree: HashMap<String, usize> = HashMap::with_capacity(steps.len());
        let mut dependents: HashMap<String, Vec<String>> = HashMap::with_capacity(steps.len());
        for step in steps {
            let deps: HashSet<&str> = step.dependencies.iter().map(String::as_str).collect();
            for dep in &deps {
                if !ids.contains(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.to_string(),
                    });
                }
                dependents.entry(dep.to_string()).or_default().push(step.id.clone());
            }
            in_degree.insert(step.id.clone(), deps.len());
        }

        // Levels keep declaration order so plans are deterministic
        let mut remaining = in_degree.clone();
        let mut current: Vec<String> = steps
            .iter()
            .filter(|s| remaining[&s.id] == 0)
            .map(|s| s.id.clone())
            .collect();
        let mut order = Vec::with_capacity(steps.len());
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut released = HashSet::new();
            for id in &current {
                for child in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            released.insert(child.clone());
                        }
                    }
                }
            }
            order.extend(current.iter().cloned());
            levels.push(std::mem::take(&mut current));
            current = steps
                .iter()
                .filter(|s| released.contains(&s.id))
                .map(|s| s.id.clone())
                .collect();
        }

        if order.len() < steps.len() {
            let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let stuck = steps
                .iter()
                .filter(|s| !placed.contains(s.id.as_str()))
                .map(|s| s.id.clone())
                .collect();
            return Err(WorkflowError::CyclicDependency {
                workflow: workflow_id.to_string(),
                steps: stuck,
            });
        }

        Ok(Self { order, levels, dependents, in_degree })
    }

    /// Steps with no dependencies
    pub fn roots(&self) -> Vec<String> {
        self.levels.first().cloned().unwrap_or_default()
    }

    /// Steps depending on `id`
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}
