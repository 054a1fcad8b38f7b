//! Cloud collaborator error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by cloud collaborators and state storage
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Deployment '{deployment}' is locked by {holder} ({operation}) since {since}")]
    Locked {
        deployment: String,
        operation: String,
        holder: String,
        since: DateTime<Utc>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::Timeout(_) | CloudError::RateLimited(_) | CloudError::Unavailable(_)
        )
    }
}

/// Errors raised when wrapping secret input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret value must not be empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, CloudError>;
