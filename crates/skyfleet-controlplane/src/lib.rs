//! Skyfleet control plane
//!
//! Chooses where a deployment goes and drives it there.
//!
//! - [`ranking`]: turns a preference model and provider capability
//!   snapshots into a deterministic, ordered candidate list
//! - [`CandidateIterator`]: forward-only fallback over that list
//! - [`Workflow`]: the create/update/delete state machine
//! - [`CleanupCoordinator`]: best-effort resource teardown
//! - [`DeploymentService`]: spawns one workflow run per operation
//!
//! # Example
//!
//! ```ignore
//! let workflow = Workflow::new(store, resolver, delegates).with_cleanup(cleanup);
//! let service = DeploymentService::new(workflow, &config.workflow);
//!
//! let run = service
//!     .submit(DeploymentRequest::new(template, vec![ServiceType::Compute]), Some(identity))
//!     .await?;
//! let deployment = run.wait().await?;
//! ```

pub mod cleanup;
pub mod context;
pub mod iterator;
pub mod ranking;
pub mod service;
pub mod workflow;

pub use cleanup::CleanupCoordinator;
pub use context::{DeploymentExecutionContext, Phase};
pub use iterator::CandidateIterator;
pub use ranking::{pin_candidate, rank_candidates, select, CandidateFilter, MinimalCapabilities};
pub use service::{DeploymentRequest, DeploymentService, RunHandle, UpdateRequest};
pub use workflow::Workflow;
