//! Skyfleet core
//!
//! Domain model and seams shared by the orchestrator crates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    skyfleetd                     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              skyfleet-controlplane               │
//! │   ranking · candidate iterator · workflow ·      │
//! │   cleanup coordinator                            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   catalog     │ │   cloud-s3    │
//! │  (resolver)   │ │   (cleanup)   │
//! └───────┬───────┘ └───────┬───────┘
//!         │                 │
//! ┌───────▼─────────────────▼───────────────────────┐
//! │                 skyfleet-cloud                   │
//! │  model · state store · delegates · call executor │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod cleanup;
pub mod error;
pub mod model;
pub mod provider;
pub mod state;

// Re-exports
pub use auth::{CallExecutor, TokenId, TokenProvider};
pub use cleanup::{CleanupBackend, CleanupReport, CleanupScope, DeleteOutcome};
pub use error::{AuthError, CloudError, Result};
pub use model::{
    CandidateService, CloudProviderEndpoint, CloudService, ComputeDetails, Flavor, Image,
    ProviderCapabilities, ServiceDetails, ServiceType,
};
pub use provider::{DelegateRegistry, ProvisionContext, ProvisionOutcome, ProvisioningDelegate};
pub use state::{
    update_deployment, Deployment, DeploymentStore, FileStore, MemoryStore, Operation, Resource,
    StateLock, Status,
};
