//! Child resource kinds and what collaborators hand back for them

use crate::secret::REDACTED;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Output keys published by each kind of child resource
pub mod outputs {
    /// Storage: bucket identifier
    pub const BUCKET: &str = "bucket";
    /// Database: connection endpoint (`host:port`)
    pub const DB_ENDPOINT: &str = "endpoint";
    /// ServiceCompute: network address the application listens on
    pub const ADDRESS: &str = "address";
}

/// Kind of child resource behind the composite service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Object storage bucket
    Storage,
    /// Managed database instance
    Database,
    /// Deployable application service
    ServiceCompute,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Storage => "storage",
            ResourceKind::Database => "database",
            ResourceKind::ServiceCompute => "service_compute",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource as reported by a collaborator after create, update or read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider-assigned identifier
    pub id: String,

    /// Published outputs (bucket name, endpoint, address, ...)
    pub outputs: BTreeMap<String, String>,

    /// Output keys whose values are sensitive and must not be persisted
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub secret_outputs: BTreeSet<String>,
}

impl ProvisionedResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outputs: BTreeMap::new(),
            secret_outputs: BTreeSet::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Publish an output that has to stay out of state and logs
    pub fn with_secret_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.secret_outputs.insert(key.clone());
        self.outputs.insert(key, value.into());
        self
    }

    /// Outputs as they may be persisted: secret fields are replaced by [`REDACTED`]
    pub fn persisted_outputs(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .map(|(key, value)| {
                let value = if self.secret_outputs.contains(key) {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}
