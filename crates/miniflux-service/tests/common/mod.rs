#![allow(dead_code)]

use async_trait::async_trait;
use miniflux_cloud::{
    ActionType, CloudApi, CloudError, ProvisionedResource, ResolvedInputs, ResourceKind,
    RetryConfig, outputs,
};
use miniflux_service::{MinifluxService, OrchestratorConfig, ServiceRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADMIN_PASSWORD: &str = "admin-correct-horse";
pub const DB_PASSWORD: &str = "db-battery-staple";
pub const SERVICE_ADDRESS: &str = "10.0.0.5:8080";
/// Sensitive output published by the database child
pub const MASTER_PASSWORD_OUTPUT: &str = "master_password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: ActionType,
    pub kind: ResourceKind,
}

pub fn call(op: ActionType, kind: ResourceKind) -> Call {
    Call { op, kind }
}

/// In-memory collaborator that records every call and can be told to fail
#[derive(Default)]
pub struct RecordingCloud {
    calls: Mutex<Vec<Call>>,
    inputs: Mutex<Vec<(ResourceKind, ResolvedInputs)>>,
    failures: Mutex<HashMap<(ResourceKind, ActionType), VecDeque<CloudError>>>,
    live: Mutex<HashMap<String, ProvisionedResource>>,
    next_id: AtomicUsize,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call takes `delay` to complete
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Queue an error for the next call of `op` on `kind`
    pub fn push_failure(&self, kind: ResourceKind, op: ActionType, error: CloudError) {
        self.failures
            .lock()
            .unwrap()
            .entry((kind, op))
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls other than reads
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != ActionType::Read)
            .collect()
    }

    /// Remove a resource behind the orchestrator's back
    pub fn remove_out_of_band(&self, id: &str) {
        self.live.lock().unwrap().remove(id);
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn last_inputs(&self, kind: ResourceKind) -> Option<ResolvedInputs> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, i)| i.clone())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: ActionType, kind: ResourceKind) -> Option<CloudError> {
        self.calls.lock().unwrap().push(call(op, kind));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.failures
            .lock()
            .unwrap()
            .get_mut(&(kind, op))
            .and_then(|q| q.pop_front())
    }

    fn provision(&self, kind: ResourceKind, id: String, inputs: &ResolvedInputs) -> ProvisionedResource {
        let resource = ProvisionedResource::new(id);
        match kind {
            ResourceKind::Storage => resource.with_output(
                outputs::BUCKET,
                inputs.plain("bucket_name").unwrap_or_default(),
            ),
            ResourceKind::Database => resource
                .with_output(
                    outputs::DB_ENDPOINT,
                    format!(
                        "{}.db.internal:5432",
                        inputs.plain("instance_name").unwrap_or_default()
                    ),
                )
                .with_secret_output(
                    MASTER_PASSWORD_OUTPUT,
                    inputs
                        .secret("password")
                        .map(|p| p.reveal(self).to_string())
                        .unwrap_or_default(),
                ),
            ResourceKind::ServiceCompute => resource.with_output(outputs::ADDRESS, SERVICE_ADDRESS),
        }
    }

    /// Rejects short database passwords and, badly behaved, echoes them back
    fn check_password(&self, kind: ResourceKind, inputs: &ResolvedInputs) -> Result<(), CloudError> {
        if kind != ResourceKind::Database {
            return Ok(());
        }
        if let Some(password) = inputs.secret("password") {
            let plain = password.reveal(self);
            if plain.len() < 8 {
                return Err(CloudError::InvalidInput(format!(
                    "password '{}' is shorter than 8 characters",
                    plain
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CloudApi for RecordingCloud {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        inputs: &ResolvedInputs,
    ) -> miniflux_cloud::Result<ProvisionedResource> {
        if let Some(error) = self.enter(ActionType::Create, kind).await {
            return Err(error);
        }
        self.inputs.lock().unwrap().push((kind, inputs.clone()));
        self.check_password(kind, inputs)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let resource = self.provision(kind, format!("{}-{}", kind, n), inputs);
        self.live
            .lock()
            .unwrap()
            .insert(resource.id.clone(), resource.clone());
        Ok(resource)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        inputs: &ResolvedInputs,
    ) -> miniflux_cloud::Result<ProvisionedResource> {
        if let Some(error) = self.enter(ActionType::Update, kind).await {
            return Err(error);
        }
        self.inputs.lock().unwrap().push((kind, inputs.clone()));
        self.check_password(kind, inputs)?;
        if !self.live.lock().unwrap().contains_key(id) {
            return Err(CloudError::ResourceNotFound(id.to_string()));
        }
        let resource = self.provision(kind, id.to_string(), inputs);
        self.live
            .lock()
            .unwrap()
            .insert(resource.id.clone(), resource.clone());
        Ok(resource)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> miniflux_cloud::Result<()> {
        if let Some(error) = self.enter(ActionType::Delete, kind).await {
            return Err(error);
        }
        match self.live.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(CloudError::ResourceNotFound(id.to_string())),
        }
    }

    async fn read(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> miniflux_cloud::Result<Option<ProvisionedResource>> {
        if let Some(error) = self.enter(ActionType::Read, kind).await {
            return Err(error);
        }
        Ok(self.live.lock().unwrap().get(id).cloned())
    }
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        max_concurrency: 1,
    }
}

pub fn service(cloud: &Arc<RecordingCloud>) -> MinifluxService {
    MinifluxService::new(cloud.clone()).with_config(fast_config())
}

pub fn request() -> ServiceRequest {
    ServiceRequest::new("feeds", ADMIN_PASSWORD, DB_PASSWORD).unwrap()
}
