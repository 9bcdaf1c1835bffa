//! Skyfleet catalog
//!
//! Turns federation-registry records (user groups, SLAs, projects and
//! quotas) into the preference model and provider capability snapshots
//! consumed by ranking.
//!
//! Both folds are pure functions over the wire records; only
//! [`FederationRegistry`] talks to the network, and only through the
//! credential-refreshing [`skyfleet_cloud::CallExecutor`].
//!
//! # Example
//!
//! ```ignore
//! use skyfleet_catalog::{CatalogResolver, FederationRegistry, Resolve, Weights};
//!
//! let registry = FederationRegistry::new(&config.catalog, executor)?;
//! let resolver = CatalogResolver::new(registry, Weights::from(&config.ranking));
//!
//! let preferences = resolver.resolve_preferences(Some(&identity), None).await?;
//! for provider in preferences.providers_for(ServiceType::Compute) {
//!     let caps = resolver
//!         .resolve_provider_capabilities(provider, &preferences.user_group_id, Some(&identity))
//!         .await?;
//! }
//! ```

pub mod capabilities;
pub mod client;
pub mod error;
pub mod fedreg;
pub mod oidc;
pub mod preferences;
pub mod resolver;

pub use capabilities::build_capabilities;
pub use client::{build_http_client, FederationRegistry};
pub use error::{CatalogError, Result};
pub use oidc::ClientCredentials;
pub use preferences::{
    build_preferences, PreferenceModel, Priority, Restriction, ServiceRestrictions,
    SlaRestrictions, Weights, DEFAULT_WEIGHT,
};
pub use resolver::{effective_user_group, CatalogResolver, Resolve};
