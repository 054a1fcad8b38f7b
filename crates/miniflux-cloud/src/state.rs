//! State management for child resources
//!
//! Every deployment name gets its own `.miniflux/<name>.state.json` file
//! recording the child resources that were provisioned for it.

use crate::error::{CloudError, Result};
use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".miniflux";

/// Persisted snapshot of one composite service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    /// State format version
    pub version: u32,

    /// Deployment name the state belongs to
    pub name: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Child resources indexed by node id
    pub resources: BTreeMap<String, ResourceState>,
}

impl ServiceState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            name: name.into(),
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }

    /// Add or replace the record for a node
    pub fn set_resource(&mut self, node: impl Into<String>, state: ResourceState) {
        self.resources.insert(node.into(), state);
        self.updated_at = Utc::now();
    }

    pub fn get_resource(&self, node: &str) -> Option<&ResourceState> {
        self.resources.get(node)
    }

    /// Records with the given kind
    pub fn by_kind(&self, kind: ResourceKind) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter().filter(move |(_, r)| r.kind == kind)
    }

    /// True when nothing is left in the cloud for this deployment
    pub fn is_torn_down(&self) -> bool {
        self.resources
            .values()
            .all(|r| r.status == ResourceStatus::Deleted || r.id.is_none())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let state: ServiceState = serde_json::from_str(content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }
}

/// State of a single child resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-assigned resource ID, absent until the resource exists
    pub id: Option<String>,

    /// Resource kind
    pub kind: ResourceKind,

    /// Current status
    pub status: ResourceStatus,

    /// Published outputs (bucket, endpoint, address)
    pub outputs: BTreeMap<String, String>,

    /// Digest of the inputs the resource was last provisioned with
    pub input_digest: Option<String>,

    /// Last failure, redacted
    pub error: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(kind: ResourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            kind,
            status: ResourceStatus::Pending,
            outputs: BTreeMap::new(),
            input_digest: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_input_digest(mut self, digest: impl Into<String>) -> Self {
        self.input_digest = Some(digest.into());
        self
    }

    /// Move to a new status, stamping `updated_at`
    pub fn transition(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
    }
}

/// Status of a child resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Not provisioned yet
    Pending,
    /// Provisioned and usable
    Ready,
    /// Last create/update exhausted its retries or hit a fatal error
    Failed,
    /// Removed from the cloud
    Deleted,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Directory holding state files
    state_dir: PathBuf,
}

impl StateManager {
    /// State files under `<project_root>/.miniflux`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            state_dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    /// State files directly under `state_dir`
    pub fn with_state_dir(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.state.json", name))
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.state.json.backup", name))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.lock.json", name))
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the state for `name`, or an empty one
    pub async fn load(&self, name: &str) -> Result<ServiceState> {
        let path = self.state_path(name);
        if !path.exists() {
            tracing::debug!(name, "State file not found, returning empty state");
            return Ok(ServiceState::new(name));
        }

        let content = fs::read_to_string(&path).await?;
        let state = ServiceState::from_json(&content)?;

        if state.name != name {
            return Err(CloudError::StateError(format!(
                "State file {} belongs to '{}', not '{}'",
                path.display(),
                state.name,
                name
            )));
        }

        tracing::debug!(name, resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &ServiceState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path(&state.name);
        let backup = self.backup_path(&state.name);

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        fs::write(&path, state.to_json()?).await?;

        tracing::debug!(
            name = %state.name,
            resources = state.resources.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Take the per-deployment lock for `operation` (`up`, `down`, `refresh`, ...).
    ///
    /// A lock left behind for longer than [`LOCK_TTL_MINUTES`] is taken over.
    pub async fn acquire_lock(&self, name: &str, operation: &str) -> Result<StateLock> {
        self.ensure_state_dir().await?;
        let lock_path = self.lock_path(name);

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let held: LockInfo = serde_json::from_str(&content)?;
            if held.deployment != name {
                return Err(CloudError::StateError(format!(
                    "lock file {} belongs to deployment '{}'",
                    lock_path.display(),
                    held.deployment
                )));
            }

            let age = Utc::now().signed_duration_since(held.acquired_at);
            if age.num_minutes() < LOCK_TTL_MINUTES {
                return Err(CloudError::Locked {
                    deployment: held.deployment,
                    operation: held.operation,
                    holder: held.holder,
                    since: held.acquired_at,
                });
            }
            tracing::warn!(
                deployment = name,
                operation = %held.operation,
                holder = %held.holder,
                "Taking over stale deployment lock"
            );
        }

        let info = LockInfo {
            deployment: name.to_string(),
            operation: operation.to_string(),
            holder: format!("{}:{}", hostname(), std::process::id()),
            acquired_at: Utc::now(),
        };
        fs::write(&lock_path, serde_json::to_string_pretty(&info)?).await?;

        tracing::debug!(deployment = name, operation, "Locked deployment");
        Ok(StateLock {
            deployment: info.deployment,
            lock_path,
            released: false,
        })
    }
}

/// Minutes after which an unreleased lock counts as abandoned
pub const LOCK_TTL_MINUTES: i64 = 60;

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Contents of `<name>.lock.json`
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    deployment: String,
    operation: String,
    /// `host:pid` of the process holding the lock
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// Exclusive hold on one deployment's state; removed on release or drop
pub struct StateLock {
    deployment: String,
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub async fn release(mut self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await?;
        }
        self.released = true;
        tracing::debug!(deployment = %self.deployment, "Unlocked deployment");
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && std::fs::remove_file(&self.lock_path).is_ok() {
            tracing::debug!(deployment = %self.deployment, "Unlocked deployment on drop");
        }
    }
}
