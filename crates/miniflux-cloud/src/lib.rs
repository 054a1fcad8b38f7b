//! Miniflux cloud boundary
//!
//! This crate defines everything the Miniflux service component shares with
//! its cloud collaborators: the [`CloudApi`] trait that creates, updates and
//! deletes child resources, the secret handles passed through it, and the
//! persisted state of each child resource.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                miniflux (CLI host)               │
//! │               (miniflux up/down)                 │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               miniflux-service                   │
//! │   graph builder · orchestrator · composer        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               miniflux-cloud                     │
//! │  trait CloudApi · SecretHandle · ServiceState    │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  local cloud  │
//! │ collaborator  │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod inputs;
pub mod provider;
pub mod resource;
pub mod secret;
pub mod state;

// Re-exports
pub use action::{Action, ActionLog, ActionType, PlanSummary};
pub use error::{CloudError, Result, SecretError};
pub use inputs::{ResolvedInputs, ResolvedValue};
pub use provider::{CloudApi, RetryConfig};
pub use resource::{ProvisionedResource, ResourceKind, outputs};
pub use secret::{MIN_SECRET_LEN, REDACTED, SecretHandle, SecretSet};
pub use state::{
    LOCK_TTL_MINUTES, ResourceState, ResourceStatus, STATE_VERSION, ServiceState, StateLock,
    StateManager,
};
