//! Local cloud collaborator for the Miniflux service
//!
//! Implements [`CloudApi`](miniflux_cloud::CloudApi) without talking to any
//! real cloud: every resource lives in an inventory, optionally persisted to
//! a JSON file. Useful for trying the CLI and for end-to-end tests.
//!
//! Behaves like a strict provider would:
//!
//! - required inputs are checked per resource kind
//! - names are unique per kind
//! - database passwords shorter than [`MIN_DB_PASSWORD_LEN`] are rejected
//! - unknown ids are reported as not found
//!
//! # Example
//!
//! ```ignore
//! use miniflux_cloud_local::LocalCloud;
//!
//! let cloud = LocalCloud::open(".miniflux/inventory.json").await?;
//! ```

pub mod error;
pub mod inventory;
pub mod provider;

pub use error::{LocalError, Result};
pub use inventory::{Inventory, InventoryEntry};
pub use provider::{LocalCloud, MIN_DB_PASSWORD_LEN};
