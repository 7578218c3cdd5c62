//! LuxGen Workflow Engine
//!
//! Named, versioned business operations executed as step graphs within a
//! tenant's isolation boundary.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    WORKFLOW ENGINE                      │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────┐   │
//! │  │  Registry  │──►│   Graph    │──►│   Scheduler    │   │
//! │  │ (overrides)│   │  (Kahn)    │   │ (JoinSet+retry)│   │
//! │  └────────────┘   └────────────┘   └───────┬────────┘   │
//! │                                            ▼            │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────┐   │
//! │  │  Context   │◄──│   Steps    │   │ Execution Store│   │
//! │  │ (data+audit)   │ (handlers) │   │  (status/stats)│   │
//! │  └────────────┘   └────────────┘   └────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod builtin;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod graph;
pub mod registry;
pub mod result;
pub mod store;

#[cfg(test)]
mod testing;

pub use context::{Actor, WorkflowContext};
pub use definition::{
    step_fn, ErrorHandling, ErrorStrategy, MergeStrategy, Step, StepType, WorkflowDefinition, WorkflowStep,
};
pub use engine::{PreparedExecution, WorkflowEngine};
pub use error::{EngineResult, StepError, StepErrorKind, WorkflowError};
pub use graph::ExecutionPlan;
pub use registry::{RegistryHealth, WorkflowDocumentation, WorkflowRegistry, WorkflowSummary};
pub use result::{ResultError, WorkflowResult, WorkflowRun};
pub use store::{ExecutionStats, ExecutionStatus, ExecutionStore, WorkflowExecution};
