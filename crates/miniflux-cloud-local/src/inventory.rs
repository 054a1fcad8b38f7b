//! On-disk record of what the local cloud has provisioned
//!
//! Only plain inputs are kept. Secret inputs are reduced to their presence.

use crate::error::{LocalError, Result};
use chrono::{DateTime, Utc};
use miniflux_cloud::{ResolvedInputs, ResolvedValue, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Serial used for the next id
    pub next_serial: u64,

    /// Resources by id
    pub resources: BTreeMap<String, InventoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub kind: ResourceKind,

    /// Name the resource was created with, unique per kind
    pub name: String,

    /// Plain inputs of the last create or update
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryEntry {
    pub fn new(kind: ResourceKind, name: impl Into<String>, inputs: &ResolvedInputs) -> Self {
        let now = Utc::now();
        Self {
            kind,
            name: name.into(),
            config: plain_config(inputs),
            outputs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Plain inputs, with secrets replaced by a marker
pub fn plain_config(inputs: &ResolvedInputs) -> BTreeMap<String, String> {
    inputs
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ResolvedValue::Plain(v) => v.clone(),
                ResolvedValue::Secret(_) => "<secret>".to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

impl Inventory {
    /// Load the inventory at `path`; a missing file is an empty inventory
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| LocalError::InventoryCorrupt(format!("{}: {}", path.display(), e)))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn allocate_id(&mut self, kind: ResourceKind) -> String {
        self.next_serial += 1;
        format!("{}-{:04}", id_prefix(kind), self.next_serial)
    }

    /// Id of the resource of `kind` called `name`, if any
    pub fn find_by_name(&self, kind: ResourceKind, name: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|(_, e)| e.kind == kind && e.name == name)
            .map(|(id, _)| id.as_str())
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Storage => "bkt",
        ResourceKind::Database => "db",
        ResourceKind::ServiceCompute => "svc",
    }
}
