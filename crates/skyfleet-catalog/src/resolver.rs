//! Catalog & preference resolution

use crate::capabilities::build_capabilities;
use crate::client::FederationRegistry;
use crate::error::CatalogError;
use crate::preferences::{build_preferences, PreferenceModel, Weights};
use async_trait::async_trait;
use skyfleet_cloud::{CloudError, ProviderCapabilities, Result, TokenId};

/// Source of preference models and capability snapshots
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Preference model of a user group
    ///
    /// Without an explicit user group the identity's organisation is used.
    async fn resolve_preferences(
        &self,
        identity: Option<&TokenId>,
        user_group: Option<&str>,
    ) -> Result<PreferenceModel>;

    /// Capability snapshot of one provider as seen by a user group
    async fn resolve_provider_capabilities(
        &self,
        provider_id: &str,
        user_group_id: &str,
        identity: Option<&TokenId>,
    ) -> Result<ProviderCapabilities>;
}

/// User group a request is resolved for
pub fn effective_user_group<'a>(
    identity: Option<&'a TokenId>,
    user_group: Option<&'a str>,
) -> Result<&'a str> {
    user_group
        .or_else(|| identity.and_then(|id| id.organisation.as_deref()))
        .ok_or_else(|| {
            CloudError::Resolution(
                "no user group requested and the identity carries no organisation".to_string(),
            )
        })
}

/// Resolver backed by the federation registry
pub struct CatalogResolver {
    registry: FederationRegistry,
    weights: Weights,
}

impl CatalogResolver {
    pub fn new(registry: FederationRegistry, weights: Weights) -> Self {
        Self { registry, weights }
    }
}

#[async_trait]
impl Resolve for CatalogResolver {
    #[tracing::instrument(skip(self, identity))]
    async fn resolve_preferences(
        &self,
        identity: Option<&TokenId>,
        user_group: Option<&str>,
    ) -> Result<PreferenceModel> {
        let customer = effective_user_group(identity, user_group)?;

        let groups = self
            .registry
            .user_groups(identity, customer)
            .await
            .map_err(|e| {
                CloudError::Resolution(format!(
                    "Error fetching SLA for customer <{customer}>: {e}"
                ))
            })?;

        let group = groups.first().ok_or_else(|| {
            CatalogError::MissingRecord(format!("no user group found for customer <{customer}>"))
        })?;

        let model = build_preferences(group, &self.weights);
        tracing::info!(
            user_group = %model.user_group_id,
            service_types = model.priorities.len(),
            "Resolved preferences"
        );
        Ok(model)
    }

    #[tracing::instrument(skip(self, identity))]
    async fn resolve_provider_capabilities(
        &self,
        provider_id: &str,
        user_group_id: &str,
        identity: Option<&TokenId>,
    ) -> Result<ProviderCapabilities> {
        let projects = self
            .registry
            .projects(identity, user_group_id, provider_id)
            .await?;

        let project = projects.first().ok_or_else(|| {
            CatalogError::MissingRecord(format!(
                "no project of user group {user_group_id} on provider {provider_id}"
            ))
        })?;

        let capabilities = build_capabilities(project)?;
        tracing::debug!(
            provider = provider_id,
            services = capabilities.services.len(),
            "Resolved provider capabilities"
        );
        Ok(capabilities)
    }
}
