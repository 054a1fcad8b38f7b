//! Lifecycle hooks exposed to a host reconciliation engine

use crate::error::{ApplyFailure, Result};
use crate::graph::{self, Plan};
use crate::orchestrator::{Applied, CancelHandle, Orchestrator, OrchestratorConfig};
use crate::output::{self, ServiceResult};
use crate::request::ServiceRequest;
use async_trait::async_trait;
use miniflux_cloud::{CloudApi, ServiceState};
use std::sync::Arc;

/// Resource type token registered with the host engine
pub const TYPE_TOKEN: &str = "miniflux:service:MinifluxService";

/// What the host wants done with the composite resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Create or update children until they match the plan
    Converge,
    /// Remove every child
    Delete,
}

/// The contract a host engine drives
///
/// Hosts call these hooks instead of registering callbacks, so the component
/// can be exercised without a host at all.
#[async_trait]
pub trait ComponentResource: Send + Sync {
    /// Type token of the resource
    fn type_token(&self) -> &str;

    fn build_plan(&self, request: &ServiceRequest) -> Result<Plan>;

    async fn apply(
        &self,
        plan: &Plan,
        state: ServiceState,
        intent: Intent,
    ) -> std::result::Result<Applied, ApplyFailure>;

    fn compose_output(&self, state: &ServiceState) -> Result<ServiceResult>;

    fn serialize_state(&self, state: &ServiceState) -> Result<String>;

    fn deserialize_state(&self, raw: &str) -> Result<ServiceState>;
}

/// Result of a successful [`MinifluxService::create`]
#[derive(Debug, Clone)]
pub struct Deployment {
    pub endpoint: String,
    pub state: ServiceState,
}

/// The Miniflux composite service
pub struct MinifluxService {
    orchestrator: Orchestrator,
}

impl MinifluxService {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self {
            orchestrator: Orchestrator::new(cloud),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = self.orchestrator.with_config(config);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.orchestrator.cancel_handle()
    }

    /// Create (or converge) the service and return its endpoint
    pub async fn create(
        &self,
        request: &ServiceRequest,
        previous: ServiceState,
    ) -> std::result::Result<Deployment, ApplyFailure> {
        let plan = match self.build_plan(request) {
            Ok(plan) => plan,
            Err(error) => return Err(ApplyFailure::new(error, previous)),
        };

        let applied = self.orchestrator.apply(&plan, previous).await?;
        let endpoint = match applied.result {
            Some(result) => result.endpoint,
            None => match output::compose(&applied.state) {
                Ok(result) => result.endpoint,
                Err(error) => return Err(ApplyFailure::new(error, applied.state)),
            },
        };

        Ok(Deployment {
            endpoint,
            state: applied.state,
        })
    }

    /// Remove every child of the service
    pub async fn teardown(
        &self,
        request: &ServiceRequest,
        previous: ServiceState,
    ) -> std::result::Result<ServiceState, ApplyFailure> {
        let plan = match self.build_plan(request) {
            Ok(plan) => plan,
            Err(error) => return Err(ApplyFailure::new(error, previous)),
        };
        Ok(self.orchestrator.destroy(&plan, previous).await?.state)
    }

    /// Reconcile `previous` with what actually exists, without changing anything
    pub async fn refresh(
        &self,
        request: &ServiceRequest,
        previous: ServiceState,
    ) -> std::result::Result<Applied, ApplyFailure> {
        let plan = match self.build_plan(request) {
            Ok(plan) => plan,
            Err(error) => return Err(ApplyFailure::new(error, previous)),
        };
        self.orchestrator.refresh(&plan, previous).await
    }
}

#[async_trait]
impl ComponentResource for MinifluxService {
    fn type_token(&self) -> &str {
        TYPE_TOKEN
    }

    fn build_plan(&self, request: &ServiceRequest) -> Result<Plan> {
        graph::build(request)
    }

    async fn apply(
        &self,
        plan: &Plan,
        state: ServiceState,
        intent: Intent,
    ) -> std::result::Result<Applied, ApplyFailure> {
        match intent {
            Intent::Converge => self.orchestrator.apply(plan, state).await,
            Intent::Delete => self.orchestrator.destroy(plan, state).await,
        }
    }

    fn compose_output(&self, state: &ServiceState) -> Result<ServiceResult> {
        output::compose(state)
    }

    fn serialize_state(&self, state: &ServiceState) -> Result<String> {
        Ok(state.to_json()?)
    }

    fn deserialize_state(&self, raw: &str) -> Result<ServiceState> {
        Ok(ServiceState::from_json(raw)?)
    }
}
