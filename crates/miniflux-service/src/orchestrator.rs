//! Lifecycle orchestration
//!
//! The [`Orchestrator`] walks a [`Plan`] wave by wave and converges every child
//! resource through a [`CloudApi`] collaborator:
//!
//! - no record, or a record that never got an id: create
//! - inputs changed, or the last attempt failed: update
//! - Ready with identical inputs: nothing, not even a read
//!
//! Transient collaborator errors are retried with exponential backoff. Any
//! other error fails the node and stops the plan; children that already
//! finished stay Ready and nothing is rolled back. Deletion runs the waves in
//! reverse. A refresh reads every known child back and marks the ones that
//! vanished outside of the orchestrator as Deleted, so the next apply
//! recreates them.

use crate::error::{ApplyFailure, Result, ServiceError};
use crate::graph::{ChildInput, ChildResourceSpec, Plan};
use crate::output::{ServiceResult, compose};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use miniflux_cloud::{
    Action, ActionLog, ActionType, CloudApi, CloudError, ProvisionedResource, ResolvedInputs,
    ResolvedValue, ResourceState, ResourceStatus, RetryConfig, SecretSet, ServiceState,
};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::watch;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retry policy for transient collaborator errors
    pub retry: RetryConfig,

    /// Upper bound on concurrent operations within one wave.
    /// `1` keeps provisioning strictly in topological order.
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_concurrency: 1,
        }
    }
}

/// Outcome of a successful apply or destroy
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: ServiceState,
    /// Composite output; `None` after a destroy
    pub result: Option<ServiceResult>,
    pub log: ActionLog,
}

/// Child operation a run performs on every node
#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Converge,
    Teardown,
    Refresh,
}

/// Stops an orchestrator from starting new child operations
///
/// Operations already in flight are allowed to finish.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct Orchestrator {
    cloud: Arc<dyn CloudApi>,
    config: OrchestratorConfig,
    cancel: Arc<watch::Sender<bool>>,
}

enum NodeOutcome {
    Unchanged,
    Provisioned {
        action: ActionType,
        resource: ProvisionedResource,
        digest: String,
    },
    Removed,
    Refreshed(ProvisionedResource),
    Vanished,
    Failed {
        action: ActionType,
        error: ServiceError,
    },
    Skipped,
}

enum Decision {
    Create,
    Update(String),
    Unchanged,
}

impl Orchestrator {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cloud,
            config: OrchestratorConfig::default(),
            cancel: Arc::new(tx),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Converge every child resource of `plan`, starting from `previous`.
    pub async fn apply(
        &self,
        plan: &Plan,
        previous: ServiceState,
    ) -> std::result::Result<Applied, ApplyFailure> {
        let started = Instant::now();
        let mut state = check_state(plan, previous)?;
        let secrets = plan.secrets();
        let mut log = ActionLog::new();
        let mut failure: Option<ServiceError> = None;
        let halted = AtomicBool::new(false);

        tracing::info!(name = plan.name(), nodes = plan.nodes().len(), "Applying plan");

        for wave in plan.waves() {
            let outcomes = self
                .run_wave(wave, Phase::Converge, &state, &secrets, &halted)
                .await;

            for (spec, outcome) in outcomes {
                record_outcome(
                    &mut state,
                    &mut log,
                    &mut failure,
                    spec,
                    outcome,
                    Phase::Converge,
                );
            }
        }

        log.duration_ms = started.elapsed().as_millis() as u64;
        let mut applied = finish(state, log, failure, self.is_cancelled())?;

        match compose(&applied.state) {
            Ok(result) => {
                tracing::info!(
                    name = %applied.state.name,
                    endpoint = %result.endpoint,
                    summary = %applied.log.summary(),
                    "Apply complete"
                );
                applied.result = Some(result);
                Ok(applied)
            }
            Err(error) => Err(ApplyFailure {
                error,
                state: applied.state,
                log: applied.log,
            }),
        }
    }

    /// Delete every child resource of `plan` in reverse topological order.
    pub async fn destroy(
        &self,
        plan: &Plan,
        previous: ServiceState,
    ) -> std::result::Result<Applied, ApplyFailure> {
        let started = Instant::now();
        let mut state = check_state(plan, previous)?;
        let secrets = plan.secrets();
        let mut log = ActionLog::new();
        let mut failure: Option<ServiceError> = None;
        let halted = AtomicBool::new(false);

        tracing::info!(name = plan.name(), nodes = plan.nodes().len(), "Destroying plan");

        let mut waves = plan.waves();
        waves.reverse();
        for mut wave in waves {
            wave.reverse();
            let outcomes = self
                .run_wave(wave, Phase::Teardown, &state, &secrets, &halted)
                .await;

            for (spec, outcome) in outcomes {
                record_outcome(
                    &mut state,
                    &mut log,
                    &mut failure,
                    spec,
                    outcome,
                    Phase::Teardown,
                );
            }
        }

        log.duration_ms = started.elapsed().as_millis() as u64;
        let applied = finish(state, log, failure, self.is_cancelled())?;
        tracing::info!(
            name = %applied.state.name,
            summary = %applied.log.summary(),
            "Destroy complete"
        );
        Ok(applied)
    }

    /// Read every known child back and reconcile the state with what exists.
    ///
    /// Nothing is created, updated or deleted. Records whose resource is gone
    /// become Deleted; outputs of the others are refreshed.
    pub async fn refresh(
        &self,
        plan: &Plan,
        previous: ServiceState,
    ) -> std::result::Result<Applied, ApplyFailure> {
        let started = Instant::now();
        let mut state = check_state(plan, previous)?;
        let secrets = plan.secrets();
        let mut log = ActionLog::new();
        let mut failure: Option<ServiceError> = None;
        let halted = AtomicBool::new(false);

        tracing::info!(name = plan.name(), "Refreshing state");

        for wave in plan.waves() {
            let outcomes = self
                .run_wave(wave, Phase::Refresh, &state, &secrets, &halted)
                .await;

            for (spec, outcome) in outcomes {
                record_outcome(
                    &mut state,
                    &mut log,
                    &mut failure,
                    spec,
                    outcome,
                    Phase::Refresh,
                );
            }
        }

        log.duration_ms = started.elapsed().as_millis() as u64;
        let mut applied = finish(state, log, failure, self.is_cancelled())?;
        applied.result = compose(&applied.state).ok();
        Ok(applied)
    }

    /// Run one wave, up to `max_concurrency` nodes at a time.
    ///
    /// Once a node fails, or cancellation is requested, nodes that have not
    /// started yet are skipped. Nodes already running finish normally.
    async fn run_wave<'p, 'a>(
        &'a self,
        wave: Vec<&'p ChildResourceSpec>,
        phase: Phase,
        state: &'a ServiceState,
        secrets: &'a SecretSet,
        halted: &'a AtomicBool,
    ) -> Vec<(&'p ChildResourceSpec, NodeOutcome)>
    where
        'p: 'a,
    {
        let nodes: Vec<BoxFuture<'a, (&'p ChildResourceSpec, NodeOutcome)>> = wave
            .into_iter()
            .map(move |spec| {
                async move {
                    if halted.load(Ordering::SeqCst) || self.is_cancelled() {
                        return (spec, NodeOutcome::Skipped);
                    }
                    let outcome = match phase {
                        Phase::Converge => self.converge_node(spec, state, secrets).await,
                        Phase::Teardown => self.remove_node(spec, state, secrets).await,
                        Phase::Refresh => self.read_node(spec, state, secrets).await,
                    };
                    if matches!(outcome, NodeOutcome::Failed { .. }) {
                        halted.store(true, Ordering::SeqCst);
                    }
                    (spec, outcome)
                }
                .boxed()
            })
            .collect();

        stream::iter(nodes)
            .buffered(self.config.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
    }

    async fn converge_node(
        &self,
        spec: &ChildResourceSpec,
        state: &ServiceState,
        secrets: &SecretSet,
    ) -> NodeOutcome {
        let existing = state.get_resource(&spec.id);

        let inputs = match resolve_inputs(spec, state) {
            Ok(inputs) => inputs,
            Err(error) => {
                let action = match existing.and_then(|r| r.id.as_ref()) {
                    Some(_) => ActionType::Update,
                    None => ActionType::Create,
                };
                return NodeOutcome::Failed { action, error };
            }
        };
        let digest = inputs.digest();

        let (action, result) = match decide(existing, Some(&digest)) {
            Decision::Unchanged => {
                tracing::debug!(node = %spec.id, kind = %spec.kind, "Unchanged");
                return NodeOutcome::Unchanged;
            }
            Decision::Create => {
                tracing::info!(node = %spec.id, kind = %spec.kind, "Creating child resource");
                let result = self
                    .with_retry(&spec.id, ActionType::Create, secrets, || {
                        self.cloud.create(spec.kind, &inputs)
                    })
                    .await;
                (ActionType::Create, result)
            }
            Decision::Update(id) => {
                tracing::info!(node = %spec.id, kind = %spec.kind, id = %id, "Updating child resource");
                let result = self
                    .with_retry(&spec.id, ActionType::Update, secrets, || {
                        self.cloud.update(spec.kind, &id, &inputs)
                    })
                    .await;
                (ActionType::Update, result)
            }
        };

        match result {
            Ok(resource) => NodeOutcome::Provisioned {
                action,
                resource,
                digest,
            },
            Err(error) => NodeOutcome::Failed { action, error },
        }
    }

    async fn remove_node(
        &self,
        spec: &ChildResourceSpec,
        state: &ServiceState,
        secrets: &SecretSet,
    ) -> NodeOutcome {
        let Some(record) = state.get_resource(&spec.id) else {
            return NodeOutcome::Unchanged;
        };
        if record.status == ResourceStatus::Deleted {
            return NodeOutcome::Unchanged;
        }
        let Some(id) = record.id.as_deref() else {
            // Never reached the cloud
            return NodeOutcome::Removed;
        };

        tracing::info!(node = %spec.id, kind = %spec.kind, id = %id, "Deleting child resource");
        let result = self
            .with_retry(&spec.id, ActionType::Delete, secrets, || async move {
                match self.cloud.delete(spec.kind, id).await {
                    Err(CloudError::ResourceNotFound(_)) => {
                        tracing::warn!(node = %spec.id, id = %id, "Already gone");
                        Ok(())
                    }
                    other => other,
                }
            })
            .await;

        match result {
            Ok(()) => NodeOutcome::Removed,
            Err(error) => NodeOutcome::Failed {
                action: ActionType::Delete,
                error,
            },
        }
    }

    async fn read_node(
        &self,
        spec: &ChildResourceSpec,
        state: &ServiceState,
        secrets: &SecretSet,
    ) -> NodeOutcome {
        let Some(record) = state.get_resource(&spec.id) else {
            return NodeOutcome::Unchanged;
        };
        let Some(id) = record.id.as_deref() else {
            return NodeOutcome::Unchanged;
        };
        if record.status == ResourceStatus::Deleted {
            return NodeOutcome::Unchanged;
        }

        tracing::debug!(node = %spec.id, kind = %spec.kind, id = %id, "Reading child resource");
        let result = self
            .with_retry(&spec.id, ActionType::Read, secrets, || {
                self.cloud.read(spec.kind, id)
            })
            .await;

        match result {
            Ok(Some(resource)) => NodeOutcome::Refreshed(resource),
            Ok(None) => NodeOutcome::Vanished,
            Err(error) => NodeOutcome::Failed {
                action: ActionType::Read,
                error,
            },
        }
    }

    /// Call `op`, retrying transient errors with exponential backoff
    async fn with_retry<T, F, Fut>(
        &self,
        node: &str,
        operation: ActionType,
        secrets: &SecretSet,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = miniflux_cloud::Result<T>>,
    {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = retry.delay_after(attempt);
                    tracing::warn!(
                        node,
                        operation = %operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %secrets.redact(&e.to_string()),
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let error = classify(node, operation, attempt, e, secrets);
                    tracing::error!(node, operation = %operation, error = %error, "Child operation failed");
                    return Err(error);
                }
            }
        }
    }
}

/// Actions `apply` would take against `previous`, without calling any collaborator.
///
/// A node whose dependency is about to change is reported as changing too.
pub fn preview(plan: &Plan, previous: &ServiceState) -> Vec<Action> {
    let mut changing: Vec<&str> = Vec::new();
    let mut actions = Vec::with_capacity(plan.nodes().len());

    for spec in plan.nodes() {
        let existing = previous.get_resource(&spec.id);
        let upstream_changes = spec
            .depends_on
            .iter()
            .any(|d| changing.contains(&d.as_str()));
        let digest = if upstream_changes {
            None
        } else {
            resolve_inputs(spec, previous).ok().map(|i| i.digest())
        };

        let action_type = match decide(existing, digest.as_deref()) {
            Decision::Create => ActionType::Create,
            Decision::Update(_) => ActionType::Update,
            Decision::Unchanged => ActionType::NoOp,
        };
        if action_type != ActionType::NoOp {
            changing.push(&spec.id);
        }
        actions.push(Action::new(spec.id.clone(), spec.kind, action_type));
    }

    actions
}

/// Actions `destroy` would take against `previous`, in deletion order
pub fn preview_destroy(plan: &Plan, previous: &ServiceState) -> Vec<Action> {
    let mut waves = plan.waves();
    waves.reverse();
    waves
        .into_iter()
        .flat_map(|wave| wave.into_iter().rev())
        .map(|spec| {
            let action_type = match previous.get_resource(&spec.id) {
                Some(r) if r.status != ResourceStatus::Deleted && r.id.is_some() => {
                    ActionType::Delete
                }
                _ => ActionType::NoOp,
            };
            Action::new(spec.id.clone(), spec.kind, action_type)
        })
        .collect()
}

fn decide(existing: Option<&ResourceState>, digest: Option<&str>) -> Decision {
    let Some(record) = existing else {
        return Decision::Create;
    };
    let id = match (&record.id, record.status) {
        (_, ResourceStatus::Deleted) | (None, _) => return Decision::Create,
        (Some(id), _) => id,
    };
    if record.status == ResourceStatus::Ready
        && digest.is_some()
        && record.input_digest.as_deref() == digest
    {
        return Decision::Unchanged;
    }
    Decision::Update(id.clone())
}

/// Substitute deferred references with the outputs of Ready dependencies
fn resolve_inputs(spec: &ChildResourceSpec, state: &ServiceState) -> Result<ResolvedInputs> {
    let mut resolved = ResolvedInputs::new();
    for (key, input) in &spec.inputs {
        let value = match input {
            ChildInput::Literal(v) => ResolvedValue::Plain(v.clone()),
            ChildInput::Secret(handle) => ResolvedValue::Secret(handle.clone()),
            ChildInput::Deferred(reference) => {
                let record = state.get_resource(&reference.node).ok_or_else(|| {
                    ServiceError::NotReady {
                        node: reference.node.clone(),
                        status: "missing".to_string(),
                    }
                })?;
                if !record.is_ready() {
                    return Err(ServiceError::NotReady {
                        node: reference.node.clone(),
                        status: record.status.to_string(),
                    });
                }
                let output = record.output(&reference.output).ok_or_else(|| {
                    ServiceError::MissingOutput {
                        node: reference.node.clone(),
                        output: reference.output.clone(),
                    }
                })?;
                ResolvedValue::Plain(output.to_string())
            }
        };
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

fn classify(
    node: &str,
    operation: ActionType,
    attempts: u32,
    error: CloudError,
    secrets: &SecretSet,
) -> ServiceError {
    let node = node.to_string();
    let message = secrets.redact(&error.to_string());
    if error.is_transient() {
        return ServiceError::TransientCloud {
            node,
            operation,
            attempts,
            message,
        };
    }
    match error {
        CloudError::AuthenticationFailed(_) => ServiceError::Authorization {
            node,
            operation,
            message,
        },
        CloudError::InvalidInput(_) => ServiceError::InvalidInput {
            node,
            operation,
            message,
        },
        _ => ServiceError::Cloud {
            node,
            operation,
            message,
        },
    }
}

fn check_state(
    plan: &Plan,
    previous: ServiceState,
) -> std::result::Result<ServiceState, ApplyFailure> {
    if previous.name != plan.name() {
        let error = ServiceError::Validation {
            field: "state",
            message: format!(
                "state belongs to '{}', plan is for '{}'",
                previous.name,
                plan.name()
            ),
        };
        return Err(ApplyFailure::new(error, previous));
    }
    Ok(previous)
}

fn record_outcome(
    state: &mut ServiceState,
    log: &mut ActionLog,
    failure: &mut Option<ServiceError>,
    spec: &ChildResourceSpec,
    outcome: NodeOutcome,
    phase: Phase,
) {
    let existing = state.get_resource(&spec.id).cloned();
    match outcome {
        NodeOutcome::Unchanged => {
            log.add_success(Action::new(spec.id.clone(), spec.kind, ActionType::NoOp));
        }
        NodeOutcome::Provisioned {
            action,
            resource,
            digest,
        } => {
            let mut record = existing
                .filter(|r| r.status != ResourceStatus::Deleted)
                .unwrap_or_else(|| ResourceState::new(spec.kind));
            record.outputs = resource.persisted_outputs();
            record.id = Some(resource.id);
            record.input_digest = Some(digest);
            record.error = None;
            record.transition(ResourceStatus::Ready);
            tracing::info!(node = %spec.id, action = %action, "Child resource ready");
            state.set_resource(spec.id.clone(), record);
            log.add_success(Action::new(spec.id.clone(), spec.kind, action));
        }
        NodeOutcome::Removed => {
            let mut record = existing.unwrap_or_else(|| ResourceState::new(spec.kind));
            record.outputs.clear();
            record.error = None;
            record.transition(ResourceStatus::Deleted);
            tracing::info!(node = %spec.id, "Child resource deleted");
            state.set_resource(spec.id.clone(), record);
            log.add_success(Action::new(spec.id.clone(), spec.kind, ActionType::Delete));
        }
        NodeOutcome::Refreshed(resource) => {
            if let Some(mut record) = existing {
                record.outputs = resource.persisted_outputs();
                record.touch();
                state.set_resource(spec.id.clone(), record);
            }
            log.add_success(Action::new(spec.id.clone(), spec.kind, ActionType::Read));
        }
        NodeOutcome::Vanished => {
            if let Some(mut record) = existing {
                record.outputs.clear();
                record.input_digest = None;
                record.transition(ResourceStatus::Deleted);
                tracing::warn!(node = %spec.id, "Child resource vanished outside of the orchestrator");
                state.set_resource(spec.id.clone(), record);
            }
            log.add_success(Action::new(spec.id.clone(), spec.kind, ActionType::Read));
        }
        NodeOutcome::Failed { action, error } => {
            let mut record = existing
                .filter(|r| r.status != ResourceStatus::Deleted || action == ActionType::Delete)
                .unwrap_or_else(|| ResourceState::new(spec.kind));
            let message = error.to_string();
            record.error = Some(message.clone());
            if matches!(action, ActionType::Delete | ActionType::Read) {
                record.touch();
            } else {
                record.transition(ResourceStatus::Failed);
            }
            state.set_resource(spec.id.clone(), record);
            log.add_failure(Action::new(spec.id.clone(), spec.kind, action), message);
            failure.get_or_insert(error);
        }
        NodeOutcome::Skipped => {
            let untouched = existing
                .as_ref()
                .is_none_or(|r| r.status == ResourceStatus::Deleted);
            if untouched && phase == Phase::Converge {
                state.set_resource(spec.id.clone(), ResourceState::new(spec.kind));
            }
            tracing::debug!(node = %spec.id, "Skipped");
            log.add_skipped(spec.id.clone());
        }
    }
}

fn finish(
    state: ServiceState,
    log: ActionLog,
    failure: Option<ServiceError>,
    cancelled: bool,
) -> std::result::Result<Applied, ApplyFailure> {
    let error = match failure {
        Some(error) => Some(error),
        None if cancelled && !log.skipped.is_empty() => Some(ServiceError::Cancelled {
            skipped: log.skipped.clone(),
        }),
        None => None,
    };

    if let Some(error) = error {
        tracing::error!(name = %state.name, error = %error, "Plan stopped");
        return Err(ApplyFailure { error, state, log });
    }

    Ok(Applied {
        state,
        result: None,
        log,
    })
}
