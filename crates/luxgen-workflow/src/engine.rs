//! Workflow execution engine
//!
//! Runs a definition's step graph against a [`WorkflowContext`]. Ready
//! steps are spawned onto a `JoinSet` as soon as their dependencies have
//! finished; each attempt runs under the step's own timeout, retried
//! through the shared backoff executor.
//!
//! ```text
//!   prepare ─► resolve ─► authorize ─► feature gate ─► plan ─► record(pending)
//!                                                                  │
//!   run ─► running ─► [ready steps] ─► JoinSet ─► merge / errors ──┤
//!                         ▲                            │           │
//!                         └──── dependents released ───┘           ▼
//!                                            completed | failed | cancelled
//! ```

use crate::context::WorkflowContext;
use crate::definition::{ErrorStrategy, MergeStrategy, WorkflowDefinition, WorkflowStep};
use crate::error::{EngineResult, StepError, WorkflowError};
use crate::graph::ExecutionPlan;
use crate::registry::WorkflowRegistry;
use crate::result::{ResultError, WorkflowResult, WorkflowRun};
use crate::store::{ExecutionStats, ExecutionStatus, ExecutionStore, WorkflowExecution};
use dashmap::DashMap;
use luxgen_common::{retry, AuditLog, BackoffPolicy, ErrorCode, TenantId};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

/// Execution that passed all pre-flight checks and awaits [`WorkflowEngine::run`]
pub struct PreparedExecution {
    id: String,
    definition: Arc<WorkflowDefinition>,
    plan: ExecutionPlan,
    ctx: WorkflowContext,
    cancel: watch::Receiver<bool>,
}

impl PreparedExecution {
    /// Execution id, valid for status and cancel calls immediately
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Definition that will run
    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }
}

/// Workflow engine
pub struct WorkflowEngine {
    registry: Arc<WorkflowRegistry>,
    store: Arc<ExecutionStore>,
    cancellations: DashMap<String, watch::Sender<bool>>,
    audit: Option<AuditLog>,
}

impl WorkflowEngine {
    /// Create engine with a fresh execution store
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self::with_store(registry, Arc::new(ExecutionStore::new()))
    }

    /// Create engine over an existing store
    pub fn with_store(registry: Arc<WorkflowRegistry>, store: Arc<ExecutionStore>) -> Self {
        Self { registry, store, cancellations: DashMap::new(), audit: None }
    }

    /// Also copy every execution's audit trail into a process-wide log
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Registry
    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Execution store
    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Prepare and run to completion
    pub async fn execute(&self, workflow_id: &str, ctx: WorkflowContext) -> EngineResult<WorkflowRun> {
        let prepared = self.prepare(workflow_id, ctx)?;
        Ok(self.run(prepared).await)
    }

    /// Resolve, authorize and validate, then record a pending execution.
    ///
    /// Any error here means no step has run and no execution was recorded.
    pub fn prepare(&self, workflow_id: &str, ctx: WorkflowContext) -> EngineResult<PreparedExecution> {
        let (definition, plan) = match self.preflight(workflow_id, &ctx) {
            Ok(checked) => checked,
            Err(err) => {
                tracing::warn!(
                    workflow_id,
                    tenant_id = %ctx.tenant_id(),
                    code = err.code(),
                    "workflow rejected: {}",
                    err
                );
                ctx.audit_event(
                    "workflow_error",
                    workflow_id,
                    json!({ "code": err.code(), "message": err.to_string() }),
                );
                self.forward_audit(&ctx);
                metrics::counter!("luxgen_workflow_rejections_total", "code" => err.code()).increment(1);
                return Err(err);
            }
        };

        let id = Uuid::new_v4().to_string();
        let mut execution = WorkflowExecution::new(
            id.clone(),
            &definition.id,
            &definition.version,
            ctx.tenant_id().clone(),
            ctx.user_id().map(str::to_string),
        );
        execution.metadata = json!({
            "requestId": ctx.request_id(),
            "tenantSlug": ctx.tenant_slug(),
            "steps": definition.steps.len(),
        });
        self.store.insert(execution);

        let (tx, rx) = watch::channel(false);
        self.cancellations.insert(id.clone(), tx);

        Ok(PreparedExecution { id, definition, plan, ctx, cancel: rx })
    }

    fn preflight(
        &self,
        workflow_id: &str,
        ctx: &WorkflowContext,
    ) -> EngineResult<(Arc<WorkflowDefinition>, ExecutionPlan)> {
        let definition = self.registry.resolve_for(workflow_id, ctx.tenant_id())?;
        if let Some(feature) = &definition.required_feature {
            ctx.tenant_context().check_feature(feature)?;
        }
        let plan = ExecutionPlan::for_definition(&definition)?;
        Ok((definition, plan))
    }

    /// Run a prepared execution to a terminal status
    pub async fn run(&self, prepared: PreparedExecution) -> WorkflowRun {
        let PreparedExecution { id, definition, plan, ctx, cancel } = prepared;
        let span = tracing::info_span!(
            "workflow",
            workflow_id = %definition.id,
            execution_id = %id,
            tenant_id = %ctx.tenant_id(),
        );

        async {
            let started = Instant::now();
            self.store.mark_running(&id);
            ctx.audit_event(
                "workflow_started",
                &definition.id,
                json!({ "executionId": id, "version": definition.version }),
            );
            tracing::info!(version = %definition.version, "workflow started");

            let outcome = self.schedule(&id, &definition, &plan, &ctx, cancel).await;

            if outcome.critical_failure.is_some() && definition.error_handling.strategy == ErrorStrategy::Compensate {
                compensate(&definition, &outcome.completed, &ctx).await;
            }

            let (status, result) = reduce(&definition, outcome);
            self.finish(&id, &definition, &ctx, status, &result, started.elapsed());

            WorkflowRun {
                execution_id: id.clone(),
                workflow_id: definition.id.clone(),
                version: definition.version.clone(),
                status,
                result,
                audit_trail: ctx.audit().entries(),
            }
        }
        .instrument(span)
        .await
    }

    async fn schedule(
        &self,
        execution_id: &str,
        definition: &WorkflowDefinition,
        plan: &ExecutionPlan,
        ctx: &WorkflowContext,
        mut cancel: watch::Receiver<bool>,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let mut waiting = plan.in_degree.clone();
        let mut ready: VecDeque<String> = plan.roots().into();
        let mut finished: HashSet<String> = HashSet::new();
        let mut tasks: JoinSet<StepReport> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, Arc<WorkflowStep>> = HashMap::new();
        let mut cancel_open = true;
        outcome.cancelled = *cancel.borrow();

        loop {
            if !outcome.cancelled && outcome.critical_failure.is_none() {
                while let Some(step_id) = ready.pop_front() {
                    if let Some(step) = definition.get_step(&step_id) {
                        let policy = definition.error_handling.policy_for(step);
                        let handle = tasks.spawn(run_step(Arc::clone(step), ctx.clone(), policy));
                        in_flight.insert(handle.id(), Arc::clone(step));
                    }
                }
            }
            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let report = match joined {
                        Some(joined) => match settle(joined, &mut in_flight) {
                            Ok(report) => report,
                            Err(err) => {
                                tracing::error!(error = %err, "unattributed step task failed to join");
                                let label = format!("task-{}", err.id());
                                let lost = StepError::panicked(&label);
                                outcome.errors.push(ResultError::from_step(&label, &lost));
                                if outcome.critical_failure.is_none() {
                                    outcome.critical_failure = Some((label, lost));
                                }
                                continue;
                            }
                        },
                        None => break,
                    };
                    let step_id = report.step.id.clone();
                    finished.insert(step_id.clone());

                    match report.result {
                        Ok(output) => {
                            ctx.record_output(&step_id, output.clone());
                            self.store.update(execution_id, |e| {
                                e.attempts.insert(step_id.clone(), report.attempts);
                                e.results.insert(step_id.clone(), output.clone());
                            });
                            merge_output(&mut outcome.data, &report.step, output);
                            outcome.completed.push(step_id.clone());
                        }
                        Err(err) => {
                            ctx.record_failure(&step_id);
                            let entry = ResultError::from_step(&step_id, &err);
                            self.store.update(execution_id, |e| {
                                e.attempts.insert(step_id.clone(), report.attempts);
                                e.errors.push(entry.clone());
                            });
                            outcome.errors.push(entry);

                            if report.step.critical {
                                tracing::warn!(step_id = %step_id, code = %err.code, "critical step failed, aborting");
                                // In-flight siblings drain so their effects can be compensated
                                outcome.critical_failure = Some((step_id, err));
                                continue;
                            }
                            tracing::warn!(step_id = %step_id, code = %err.code, "non-critical step failed");
                        }
                    }

                    for child in plan.dependents_of(&step_id) {
                        if let Some(count) = waiting.get_mut(child) {
                            *count -= 1;
                            if *count == 0 {
                                ready.push_back(child.clone());
                            }
                        }
                    }
                }
                changed = cancel.changed(), if cancel_open && !outcome.cancelled => {
                    if changed.is_err() {
                        cancel_open = false;
                    } else if *cancel.borrow() {
                        outcome.cancelled = true;
                        tracing::info!(in_flight = tasks.len(), "cancellation requested");
                        ctx.audit_event(
                            "workflow_cancel_requested",
                            &definition.id,
                            json!({ "executionId": execution_id, "inFlight": tasks.len() }),
                        );
                    }
                }
            }
        }

        outcome.skipped = plan.order.iter().filter(|id| !finished.contains(*id)).cloned().collect();
        outcome
    }

    fn finish(
        &self,
        id: &str,
        definition: &WorkflowDefinition,
        ctx: &WorkflowContext,
        status: ExecutionStatus,
        result: &WorkflowResult,
        elapsed: Duration,
    ) {
        self.cancellations.remove(id);
        self.store.update(id, |e| {
            e.status = status;
            e.end_time = Some(chrono::Utc::now());
        });

        let action = match status {
            ExecutionStatus::Completed => "workflow_completed",
            ExecutionStatus::Cancelled => "workflow_cancelled",
            _ => "workflow_error",
        };
        ctx.audit_event(
            action,
            &definition.id,
            json!({
                "executionId": id,
                "statusCode": result.status_code,
                "errors": result.errors.len(),
                "durationMs": elapsed.as_millis() as u64,
            }),
        );
        self.forward_audit(ctx);

        let status_label = match status {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Cancelled => "cancelled",
            _ => "failed",
        };
        metrics::counter!(
            "luxgen_workflow_executions_total",
            "workflow" => definition.id.clone(),
            "status" => status_label
        )
        .increment(1);
        metrics::histogram!("luxgen_workflow_duration_seconds", "workflow" => definition.id.clone())
            .record(elapsed.as_secs_f64());

        tracing::info!(
            status = status_label,
            errors = result.errors.len(),
            duration_ms = elapsed.as_millis() as u64,
            "workflow finished"
        );
    }

    fn forward_audit(&self, ctx: &WorkflowContext) {
        if let Some(audit) = &self.audit {
            for entry in ctx.audit().entries() {
                audit.record(entry);
            }
        }
    }

    /// Request cancellation.
    ///
    /// Returns `false` if the execution already finished. In-flight steps
    /// are left to finish; nothing new is scheduled.
    pub fn cancel(&self, execution_id: &str) -> EngineResult<bool> {
        if let Some(sender) = self.cancellations.get(execution_id) {
            sender.send_replace(true);
            self.store.update(execution_id, |e| {
                if !e.status.is_terminal() {
                    e.status = ExecutionStatus::Cancelled;
                }
            });
            tracing::info!(execution_id, "execution cancelled");
            return Ok(true);
        }
        match self.store.get(execution_id) {
            Some(_) => Ok(false),
            None => Err(WorkflowError::ExecutionNotFound(execution_id.to_string())),
        }
    }

    /// Execution record
    pub fn execution_status(&self, execution_id: &str) -> EngineResult<WorkflowExecution> {
        self.store
            .get(execution_id)
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Aggregate statistics
    pub fn statistics(&self, tenant_id: Option<&TenantId>) -> ExecutionStats {
        self.store.statistics(tenant_id)
    }

    /// Evict finished executions older than `max_age`
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.store.cleanup(max_age)
    }

    /// Executions not yet finished
    pub fn active(&self) -> usize {
        self.cancellations.len()
    }
}

#[derive(Default)]
struct Outcome {
    data: Map<String, Value>,
    errors: Vec<ResultError>,
    completed: Vec<String>,
    skipped: Vec<String>,
    critical_failure: Option<(String, StepError)>,
    cancelled: bool,
}

struct StepReport {
    step: Arc<WorkflowStep>,
    result: Result<Value, StepError>,
    attempts: u32,
}

async fn run_step(step: Arc<WorkflowStep>, ctx: WorkflowContext, policy: BackoffPolicy) -> StepReport {
    let span = tracing::info_span!("step", step_id = %step.id);
    let step_ref = &step;
    let ctx_ref = &ctx;

    let outcome = retry::retry(
        &policy,
        move |attempt| async move {
            ctx_ref.audit_event(
                "step_started",
                &step_ref.id,
                json!({ "attempt": attempt, "type": step_ref.step_type }),
            );
            metrics::counter!("luxgen_workflow_step_attempts_total", "step" => step_ref.id.clone()).increment(1);

            let result = invoke(step_ref, ctx_ref).await;
            match &result {
                Ok(_) => ctx_ref.audit_event("step_completed", &step_ref.id, json!({ "attempt": attempt })),
                Err(err) => ctx_ref.audit_event(
                    "step_failed",
                    &step_ref.id,
                    json!({
                        "attempt": attempt,
                        "code": err.code,
                        "message": err.message,
                        "retryable": err.retryable,
                    }),
                ),
            }
            result
        },
        move |attempt, err: &StepError| {
            tracing::debug!(attempt, code = %err.code, "step will be retried");
            ctx_ref.audit_event(
                "step_retry",
                &step_ref.id,
                json!({ "attempt": attempt, "nextAttempt": attempt + 1, "code": err.code }),
            );
        },
    )
    .instrument(span)
    .await;

    StepReport { step: Arc::clone(&step), result: outcome.result, attempts: outcome.attempts }
}

/// Attribute a joined task to its step. A task that died before reporting
/// becomes a failed, non-retryable attempt of that step.
fn settle(
    joined: Result<(task::Id, StepReport), JoinError>,
    in_flight: &mut HashMap<task::Id, Arc<WorkflowStep>>,
) -> Result<StepReport, JoinError> {
    match joined {
        Ok((task_id, report)) => {
            in_flight.remove(&task_id);
            Ok(report)
        }
        Err(err) => match in_flight.remove(&err.id()) {
            Some(step) => {
                tracing::error!(step_id = %step.id, error = %err, "step task failed to join");
                Ok(StepReport { result: Err(StepError::panicked(&step.id)), attempts: 1, step })
            }
            None => Err(err),
        },
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn invoke(step: &WorkflowStep, ctx: &WorkflowContext) -> Result<Value, StepError> {
    let handler = Arc::clone(&step.handler);
    let task_ctx = ctx.clone();
    let mut task = AbortOnDrop(tokio::spawn(async move { handler.execute(&task_ctx).await }));

    match tokio::time::timeout(step.timeout, &mut task.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) if err.is_panic() => {
            tracing::error!(step_id = %step.id, "step handler panicked");
            Err(StepError::panicked(&step.id))
        }
        Ok(Err(_)) => Err(StepError::new(format!("step '{}' was interrupted", step.id))),
        Err(_) => {
            tracing::warn!(step_id = %step.id, timeout_ms = step.timeout.as_millis() as u64, "step timed out");
            Err(StepError::timeout(&step.id, step.timeout))
        }
    }
}

fn merge_output(data: &mut Map<String, Value>, step: &WorkflowStep, output: Value) {
    match &step.merge {
        MergeStrategy::StepId => {
            data.insert(step.id.clone(), output);
        }
        MergeStrategy::Key(key) => {
            data.insert(key.clone(), output);
        }
        MergeStrategy::Root => match output {
            Value::Object(fields) => data.extend(fields),
            Value::Null => {}
            other => {
                data.insert(step.id.clone(), other);
            }
        },
    }
}

async fn compensate(definition: &WorkflowDefinition, completed: &[String], ctx: &WorkflowContext) {
    for step_id in completed.iter().rev() {
        let Some(step) = definition.get_step(step_id) else {
            continue;
        };
        match tokio::time::timeout(step.timeout, step.handler.compensate(ctx)).await {
            Ok(Ok(())) => ctx.audit_event("step_compensated", step_id, Value::Null),
            Ok(Err(err)) => {
                tracing::warn!(step_id = %step_id, code = %err.code, "compensation failed");
                ctx.audit_event(
                    "step_compensation_failed",
                    step_id,
                    json!({ "code": err.code, "message": err.message }),
                );
            }
            Err(_) => {
                tracing::warn!(step_id = %step_id, "compensation timed out");
                ctx.audit_event("step_compensation_failed", step_id, json!({ "code": "STEP_TIMEOUT" }));
            }
        }
    }
}

fn reduce(definition: &WorkflowDefinition, outcome: Outcome) -> (ExecutionStatus, WorkflowResult) {
    let Outcome { data, errors, skipped, critical_failure, cancelled, .. } = outcome;

    if let Some((step_id, err)) = critical_failure {
        let mut result = WorkflowResult::failed(
            format!("Workflow '{}' failed at step '{}': {}", definition.id, step_id, err.message),
            err.status_code,
            errors,
        );
        result.data = data;
        if !skipped.is_empty() {
            tracing::debug!(skipped = ?skipped, "steps skipped after critical failure");
        }
        return (ExecutionStatus::Failed, result);
    }

    if cancelled {
        let mut result = WorkflowResult::failed(format!("Workflow '{}' was cancelled", definition.id), 409, errors);
        result.data = data;
        return (ExecutionStatus::Cancelled, result);
    }

    let message = if errors.is_empty() {
        format!("Workflow '{}' completed successfully", definition.id)
    } else {
        format!("Workflow '{}' completed with {} non-critical error(s)", definition.id, errors.len())
    };
    let mut result = WorkflowResult::ok(message, data);
    result.errors = errors;
    (ExecutionStatus::Completed, result)
}
