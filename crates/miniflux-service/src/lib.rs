//! Miniflux composite service
//!
//! Provisions a Miniflux deployment as one composite resource made of three
//! children:
//!
//! 1. `storage` - object storage bucket
//! 2. `database` - managed database instance
//! 3. `service` - the application, wired to the bucket and the database
//!
//! # Example
//!
//! ```ignore
//! use miniflux_service::{MinifluxService, ServiceRequest};
//! use miniflux_cloud::ServiceState;
//!
//! let service = MinifluxService::new(cloud);
//! let request = ServiceRequest::new("feeds", admin_password, db_password)?;
//!
//! let deployment = service.create(&request, ServiceState::new("feeds")).await?;
//! println!("{}", deployment.endpoint);
//! ```

pub mod component;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod output;
pub mod request;

pub use component::{ComponentResource, Deployment, Intent, MinifluxService, TYPE_TOKEN};
pub use error::{ApplyFailure, Result, ServiceError};
pub use graph::{
    ChildInput, ChildResourceSpec, DATABASE_NODE, OutputRef, Plan, SERVICE_NODE, STORAGE_NODE,
    build, topological_order,
};
pub use orchestrator::{
    Applied, CancelHandle, Orchestrator, OrchestratorConfig, preview, preview_destroy,
};
pub use output::{ServiceResult, compose};
pub use request::{ServiceRequest, ServiceSettings};
