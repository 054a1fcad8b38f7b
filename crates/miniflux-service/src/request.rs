//! Desired state of the composite service and its validation

use crate::error::{Result, ServiceError};
use miniflux_cloud::{MIN_SECRET_LEN, SecretHandle};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 40;

/// Desired state of one Miniflux deployment
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    /// Deployment name, scopes every child resource name
    pub name: String,
    pub admin_password: SecretHandle,
    pub db_password: SecretHandle,
    pub settings: ServiceSettings,
}

/// Application-level knobs for the compute child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Container image to run
    pub image: String,
    /// Port the container listens on
    pub container_port: u16,
    /// CPU units per task
    pub cpu: u32,
    /// Memory per task in MiB
    pub memory_mb: u32,
    /// Number of tasks to keep running
    pub desired_count: u32,
    /// Database engine for the managed instance
    pub database_engine: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            image: "miniflux/miniflux:latest".to_string(),
            container_port: 80,
            cpu: 256,
            memory_mb: 512,
            desired_count: 5,
            database_engine: "postgres".to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(invalid("image", "must not be empty"));
        }
        if self.container_port == 0 {
            return Err(invalid("container_port", "must be greater than zero"));
        }
        if self.cpu == 0 {
            return Err(invalid("cpu", "must be greater than zero"));
        }
        if self.memory_mb == 0 {
            return Err(invalid("memory_mb", "must be greater than zero"));
        }
        if self.desired_count == 0 {
            return Err(invalid("desired_count", "must be greater than zero"));
        }
        if self.database_engine.trim().is_empty() {
            return Err(invalid("database_engine", "must not be empty"));
        }
        Ok(())
    }
}

impl ServiceRequest {
    /// Wrap raw secrets and validate everything.
    ///
    /// The raw strings are moved into [`SecretHandle`]s and not kept anywhere
    /// else.
    pub fn new(
        name: impl Into<String>,
        admin_password: impl Into<String>,
        db_password: impl Into<String>,
    ) -> Result<Self> {
        let admin_password = wrap_secret("admin_password", admin_password.into())?;
        let db_password = wrap_secret("db_password", db_password.into())?;
        Self::from_handles(name, admin_password, db_password)
    }

    /// Build a request from secrets that were already wrapped by the caller
    pub fn from_handles(
        name: impl Into<String>,
        admin_password: SecretHandle,
        db_password: SecretHandle,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        check_secret_len("admin_password", &admin_password)?;
        check_secret_len("db_password", &db_password)?;
        Ok(Self {
            name,
            admin_password,
            db_password,
            settings: ServiceSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }
}

fn wrap_secret(field: &'static str, raw: String) -> Result<SecretHandle> {
    SecretHandle::wrap(raw).map_err(|e| ServiceError::Validation {
        field,
        message: e.to_string(),
    })
}

fn check_secret_len(field: &'static str, secret: &SecretHandle) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(invalid(
            field,
            &format!("must be at least {} characters", MIN_SECRET_LEN),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("name", "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(
            "name",
            &format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "name",
            "may only contain lowercase letters, digits and '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("name", "must not start or end with '-'"));
    }
    Ok(())
}

fn invalid(field: &'static str, message: &str) -> ServiceError {
    ServiceError::Validation {
        field,
        message: message.to_string(),
    }
}
