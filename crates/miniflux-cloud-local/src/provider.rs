//! Local cloud collaborator implementation

use crate::error::{LocalError, Result};
use crate::inventory::{Inventory, InventoryEntry, plain_config};
use async_trait::async_trait;
use chrono::Utc;
use miniflux_cloud::{CloudApi, ProvisionedResource, ResolvedInputs, ResourceKind, outputs};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Shortest database password the local cloud accepts
pub const MIN_DB_PASSWORD_LEN: usize = 8;

const DEFAULT_REGION: &str = "local";

/// Cloud collaborator that provisions nothing real
///
/// Resources are tracked in an inventory, optionally persisted to a JSON
/// file so that separate CLI invocations see the same resources. Ids and
/// addresses are derived from names, so runs are reproducible.
pub struct LocalCloud {
    inventory: Mutex<Inventory>,
    path: Option<PathBuf>,
    region: String,
}

impl LocalCloud {
    /// Inventory that lives only as long as this value
    pub fn in_memory() -> Self {
        Self {
            inventory: Mutex::new(Inventory::default()),
            path: None,
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Open (or start) the inventory persisted at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inventory = Inventory::load(&path).await?;
        tracing::debug!(
            path = %path.display(),
            resources = inventory.resources.len(),
            "Opened local inventory"
        );
        Ok(Self {
            inventory: Mutex::new(inventory),
            path: Some(path),
            region: DEFAULT_REGION.to_string(),
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Snapshot of every tracked resource, by id
    pub async fn resources(&self) -> Vec<(String, InventoryEntry)> {
        self.inventory
            .lock()
            .await
            .resources
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    async fn persist(&self, inventory: &Inventory) -> Result<()> {
        if let Some(path) = &self.path {
            inventory.save(path).await?;
        }
        Ok(())
    }

    /// Check required inputs and return the resource name
    fn validate(&self, kind: ResourceKind, inputs: &ResolvedInputs) -> Result<String> {
        match kind {
            ResourceKind::Storage => Ok(required(inputs, "bucket_name")?.to_string()),
            ResourceKind::Database => {
                let name = required(inputs, "instance_name")?;
                let engine = required(inputs, "engine")?;
                default_port(engine).ok_or_else(|| LocalError::InvalidInput {
                    key: "engine",
                    message: format!("unsupported engine '{}'", engine),
                })?;
                required(inputs, "username")?;
                let password = inputs
                    .secret("password")
                    .ok_or(LocalError::MissingInput("password"))?;
                if password.reveal(self).len() < MIN_DB_PASSWORD_LEN {
                    return Err(LocalError::InvalidInput {
                        key: "password",
                        message: format!(
                            "must be at least {} characters",
                            MIN_DB_PASSWORD_LEN
                        ),
                    });
                }
                Ok(name.to_string())
            }
            ResourceKind::ServiceCompute => {
                let name = required(inputs, "service_name")?;
                required(inputs, "image")?;
                required(inputs, "bucket")?;
                required(inputs, "database_endpoint")?;
                inputs
                    .secret("admin_password")
                    .ok_or(LocalError::MissingInput("admin_password"))?;
                container_port(inputs)?;
                Ok(name.to_string())
            }
        }
    }

    fn outputs_for(
        &self,
        kind: ResourceKind,
        name: &str,
        inputs: &ResolvedInputs,
    ) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        match kind {
            ResourceKind::Storage => {
                out.insert(outputs::BUCKET.to_string(), name.to_string());
            }
            ResourceKind::Database => {
                let port = inputs.plain("engine").and_then(default_port).unwrap_or(5432);
                out.insert(
                    outputs::DB_ENDPOINT.to_string(),
                    format!("{}.{}.db.local:{}", name, self.region, port),
                );
            }
            ResourceKind::ServiceCompute => {
                out.insert(
                    outputs::ADDRESS.to_string(),
                    format!("{}.{}.app.local:{}", name, self.region, container_port(inputs)?),
                );
            }
        }
        Ok(out)
    }

    async fn create_resource(
        &self,
        kind: ResourceKind,
        inputs: &ResolvedInputs,
    ) -> Result<ProvisionedResource> {
        let name = self.validate(kind, inputs)?;
        let mut inventory = self.inventory.lock().await;

        if let Some(id) = inventory.find_by_name(kind, &name) {
            return Err(LocalError::NameTaken {
                kind: kind.as_str(),
                name,
                id: id.to_string(),
            });
        }

        let id = inventory.allocate_id(kind);
        let mut entry = InventoryEntry::new(kind, &name, inputs);
        entry.outputs = self.outputs_for(kind, &name, inputs)?;
        let resource = to_resource(&id, &entry);
        inventory.resources.insert(id.clone(), entry);
        self.persist(&inventory).await?;

        tracing::info!(kind = %kind, id = %id, name = %name, "Created local resource");
        Ok(resource)
    }

    async fn update_resource(
        &self,
        kind: ResourceKind,
        id: &str,
        inputs: &ResolvedInputs,
    ) -> Result<ProvisionedResource> {
        let name = self.validate(kind, inputs)?;
        let mut inventory = self.inventory.lock().await;

        if let Some(other) = inventory.find_by_name(kind, &name)
            && other != id
        {
            return Err(LocalError::NameTaken {
                kind: kind.as_str(),
                name,
                id: other.to_string(),
            });
        }

        let outputs = self.outputs_for(kind, &name, inputs)?;
        let entry = inventory
            .resources
            .get_mut(id)
            .filter(|e| e.kind == kind)
            .ok_or_else(|| LocalError::NotFound(id.to_string()))?;
        entry.name = name;
        entry.config = plain_config(inputs);
        entry.outputs = outputs;
        entry.updated_at = Utc::now();
        let resource = to_resource(id, entry);
        self.persist(&inventory).await?;

        tracing::info!(kind = %kind, id = %id, "Updated local resource");
        Ok(resource)
    }

    async fn delete_resource(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let mut inventory = self.inventory.lock().await;
        match inventory.resources.get(id) {
            Some(entry) if entry.kind == kind => {}
            _ => return Err(LocalError::NotFound(id.to_string())),
        }
        inventory.resources.remove(id);
        self.persist(&inventory).await?;

        tracing::info!(kind = %kind, id = %id, "Deleted local resource");
        Ok(())
    }
}

fn required<'a>(inputs: &'a ResolvedInputs, key: &'static str) -> Result<&'a str> {
    match inputs.plain(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(LocalError::MissingInput(key)),
    }
}

fn container_port(inputs: &ResolvedInputs) -> Result<u16> {
    let raw = required(inputs, "container_port")?;
    raw.parse::<u16>().map_err(|_| LocalError::InvalidInput {
        key: "container_port",
        message: format!("'{}' is not a port number", raw),
    })
}

fn default_port(engine: &str) -> Option<u16> {
    match engine {
        "postgres" => Some(5432),
        "mysql" | "mariadb" => Some(3306),
        _ => None,
    }
}

fn to_resource(id: &str, entry: &InventoryEntry) -> ProvisionedResource {
    let mut resource = ProvisionedResource::new(id);
    resource.outputs = entry.outputs.clone();
    resource
}

#[async_trait]
impl CloudApi for LocalCloud {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        inputs: &ResolvedInputs,
    ) -> miniflux_cloud::Result<ProvisionedResource> {
        Ok(self.create_resource(kind, inputs).await?)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        inputs: &ResolvedInputs,
    ) -> miniflux_cloud::Result<ProvisionedResource> {
        Ok(self.update_resource(kind, id, inputs).await?)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> miniflux_cloud::Result<()> {
        Ok(self.delete_resource(kind, id).await?)
    }

    async fn read(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> miniflux_cloud::Result<Option<ProvisionedResource>> {
        let inventory = self.inventory.lock().await;
        Ok(inventory
            .resources
            .get(id)
            .filter(|e| e.kind == kind)
            .map(|e| to_resource(id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniflux_cloud::{CloudError, SecretHandle};
    use tempfile::TempDir;

    fn storage_inputs() -> ResolvedInputs {
        ResolvedInputs::new().with_plain("bucket_name", "feeds-storage")
    }

    fn database_inputs(password: &str) -> ResolvedInputs {
        ResolvedInputs::new()
            .with_plain("instance_name", "feeds-db")
            .with_plain("engine", "postgres")
            .with_plain("username", "miniflux")
            .with_secret("password", SecretHandle::wrap(password).unwrap())
    }

    fn service_inputs(port: &str) -> ResolvedInputs {
        ResolvedInputs::new()
            .with_plain("service_name", "feeds-app")
            .with_plain("image", "miniflux/miniflux:latest")
            .with_plain("container_port", port)
            .with_plain("bucket", "feeds-storage")
            .with_plain("database_endpoint", "feeds-db.local.db.local:5432")
            .with_secret("admin_password", SecretHandle::wrap("admin-secret").unwrap())
    }

    #[tokio::test]
    async fn test_create_derives_outputs() {
        let cloud = LocalCloud::in_memory();

        let bucket = cloud
            .create(ResourceKind::Storage, &storage_inputs())
            .await
            .unwrap();
        assert_eq!(bucket.id, "bkt-0001");
        assert_eq!(bucket.outputs[outputs::BUCKET], "feeds-storage");

        let db = cloud
            .create(ResourceKind::Database, &database_inputs("long-enough"))
            .await
            .unwrap();
        assert_eq!(
            db.outputs[outputs::DB_ENDPOINT],
            "feeds-db.local.db.local:5432"
        );

        let app = cloud
            .create(ResourceKind::ServiceCompute, &service_inputs("8080"))
            .await
            .unwrap();
        assert_eq!(app.outputs[outputs::ADDRESS], "feeds-app.local.app.local:8080");
    }

    #[tokio::test]
    async fn test_short_password_is_rejected_without_echo() {
        let cloud = LocalCloud::in_memory();

        let error = cloud
            .create(ResourceKind::Database, &database_inputs("pw123"))
            .await
            .unwrap_err();

        assert!(matches!(error, CloudError::InvalidInput(_)));
        assert!(!error.to_string().contains("pw123"));
        assert!(cloud.resources().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_is_invalid() {
        let cloud = LocalCloud::in_memory();

        let error = cloud
            .create(ResourceKind::Storage, &ResolvedInputs::new())
            .await
            .unwrap_err();
        assert!(matches!(error, CloudError::InvalidInput(msg) if msg.contains("bucket_name")));

        let error = cloud
            .create(ResourceKind::ServiceCompute, &service_inputs("http"))
            .await
            .unwrap_err();
        assert!(matches!(error, CloudError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let cloud = LocalCloud::in_memory();
        cloud
            .create(ResourceKind::Storage, &storage_inputs())
            .await
            .unwrap();

        let error = cloud
            .create(ResourceKind::Storage, &storage_inputs())
            .await
            .unwrap_err();
        assert!(matches!(error, CloudError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_update_read_delete() {
        let cloud = LocalCloud::in_memory().with_region("eu-1");
        let app = cloud
            .create(ResourceKind::ServiceCompute, &service_inputs("80"))
            .await
            .unwrap();

        let updated = cloud
            .update(ResourceKind::ServiceCompute, &app.id, &service_inputs("8080"))
            .await
            .unwrap();
        assert_eq!(updated.id, app.id);
        assert_eq!(
            updated.outputs[outputs::ADDRESS],
            "feeds-app.eu-1.app.local:8080"
        );

        let read = cloud
            .read(ResourceKind::ServiceCompute, &app.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, updated);

        // Kind must match the id
        assert!(
            cloud
                .read(ResourceKind::Storage, &app.id)
                .await
                .unwrap()
                .is_none()
        );

        cloud
            .delete(ResourceKind::ServiceCompute, &app.id)
            .await
            .unwrap();
        let error = cloud
            .delete(ResourceKind::ServiceCompute, &app.id)
            .await
            .unwrap_err();
        assert!(matches!(error, CloudError::ResourceNotFound(_)));

        let error = cloud
            .update(ResourceKind::ServiceCompute, &app.id, &service_inputs("80"))
            .await
            .unwrap_err();
        assert!(matches!(error, CloudError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_inventory_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.json");

        let id = {
            let cloud = LocalCloud::open(&path).await.unwrap();
            cloud
                .create(ResourceKind::Database, &database_inputs("long-enough"))
                .await
                .unwrap()
                .id
        };

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("long-enough"));

        let reopened = LocalCloud::open(&path).await.unwrap();
        let found = reopened.read(ResourceKind::Database, &id).await.unwrap();
        assert!(found.is_some());

        let next = reopened
            .create(ResourceKind::Storage, &storage_inputs())
            .await
            .unwrap();
        assert_eq!(next.id, "bkt-0002");
    }
}
