//! Service component error types

use miniflux_cloud::{ActionLog, ActionType, CloudError, ServiceState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Duplicate node in resource graph: {node}")]
    DuplicateNode { node: String },

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Node '{node}' references '{reference}' without depending on it")]
    UndeclaredReference { node: String, reference: String },

    #[error("Dependency cycle detected among: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("{operation} of '{node}' failed after {attempts} attempt(s): {message}")]
    TransientCloud {
        node: String,
        operation: ActionType,
        attempts: u32,
        message: String,
    },

    #[error("{operation} of '{node}' was not authorized: {message}")]
    Authorization {
        node: String,
        operation: ActionType,
        message: String,
    },

    #[error("{operation} of '{node}' rejected its input: {message}")]
    InvalidInput {
        node: String,
        operation: ActionType,
        message: String,
    },

    #[error("{operation} of '{node}' failed: {message}")]
    Cloud {
        node: String,
        operation: ActionType,
        message: String,
    },

    #[error("Node '{node}' is not ready (status: {status})")]
    NotReady { node: String, status: String },

    #[error("Node '{node}' has no '{output}' output")]
    MissingOutput { node: String, output: String },

    #[error("Cancelled; not started: {}", .skipped.join(", "))]
    Cancelled { skipped: Vec<String> },

    #[error("State error: {0}")]
    State(#[from] CloudError),
}

impl ServiceError {
    /// Node the error is about, when there is one
    pub fn node(&self) -> Option<&str> {
        match self {
            ServiceError::DuplicateNode { node }
            | ServiceError::UnknownDependency { node, .. }
            | ServiceError::UndeclaredReference { node, .. }
            | ServiceError::TransientCloud { node, .. }
            | ServiceError::Authorization { node, .. }
            | ServiceError::InvalidInput { node, .. }
            | ServiceError::Cloud { node, .. }
            | ServiceError::NotReady { node, .. }
            | ServiceError::MissingOutput { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Whether re-invoking after a dependency materializes can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::NotReady { .. }
                | ServiceError::TransientCloud { .. }
                | ServiceError::Cancelled { .. }
        )
    }
}

/// A failed apply or destroy, carrying the best-known state
///
/// Children that finished before the failure stay in `state` as they are;
/// nothing is rolled back.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ApplyFailure {
    #[source]
    pub error: ServiceError,
    pub state: ServiceState,
    pub log: ActionLog,
}

impl ApplyFailure {
    pub fn new(error: ServiceError, state: ServiceState) -> Self {
        Self {
            error,
            state,
            log: ActionLog::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
