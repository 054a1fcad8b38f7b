//! Local cloud error types

use miniflux_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Inventory file is corrupt: {0}")]
    InventoryCorrupt(String),

    #[error("Missing input '{0}'")]
    MissingInput(&'static str),

    #[error("Invalid input '{key}': {message}")]
    InvalidInput { key: &'static str, message: String },

    #[error("{kind} named '{name}' already exists as {id}")]
    NameTaken {
        kind: &'static str,
        name: String,
        id: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<LocalError> for CloudError {
    fn from(error: LocalError) -> Self {
        match error {
            LocalError::MissingInput(_) | LocalError::InvalidInput { .. } => {
                CloudError::InvalidInput(error.to_string())
            }
            LocalError::NotFound(id) => CloudError::ResourceNotFound(id),
            LocalError::IoError(e) => CloudError::Io(e),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
