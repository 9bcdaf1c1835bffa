//! Provisioning delegate abstraction

use crate::auth::{CallExecutor, TokenId};
use crate::error::{CloudError, Result};
use crate::model::CandidateService;
use crate::state::{Deployment, Resource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// View of an in-flight run handed to delegates
pub struct ProvisionContext<'a> {
    pub deployment: &'a Deployment,
    pub identity: Option<&'a TokenId>,
    /// Remote calls made by a delegate must go through this executor
    pub executor: &'a CallExecutor,
}

/// Side effects of a successful provisioning attempt
#[derive(Debug, Clone, Default)]
pub struct ProvisionOutcome {
    pub resources: Vec<Resource>,
}

impl ProvisionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }
}

/// Provider-specific provisioning backend
///
/// The template and parameters on the deployment are opaque to the
/// orchestrator; a delegate is the only component that interprets them.
/// A failed `provision` must be reported as [`CloudError::Provisioning`]
/// for the workflow to fall back to the next candidate.
#[async_trait]
pub trait ProvisioningDelegate: Send + Sync {
    /// Provider type handled by this delegate (e.g. "openstack")
    fn provider_type(&self) -> &str;

    async fn provision(
        &self,
        ctx: &ProvisionContext<'_>,
        candidate: &CandidateService,
    ) -> Result<ProvisionOutcome>;

    /// Apply a changed template to an existing deployment
    async fn update(
        &self,
        ctx: &ProvisionContext<'_>,
        candidate: &CandidateService,
    ) -> Result<ProvisionOutcome> {
        self.provision(ctx, candidate).await
    }

    async fn deprovision(&self, ctx: &ProvisionContext<'_>) -> Result<()>;

    async fn finalize(&self, _ctx: &ProvisionContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Delegates indexed by provider type
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    delegates: HashMap<String, Arc<dyn ProvisioningDelegate>>,
    fallback: Option<Arc<dyn ProvisioningDelegate>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, delegate: Arc<dyn ProvisioningDelegate>) -> Self {
        self.delegates
            .insert(delegate.provider_type().to_string(), delegate);
        self
    }

    /// Delegate used for provider types without a dedicated one
    pub fn with_default(mut self, delegate: Arc<dyn ProvisioningDelegate>) -> Self {
        self.fallback = Some(delegate);
        self
    }

    pub fn get(&self, provider_type: &str) -> Result<Arc<dyn ProvisioningDelegate>> {
        self.delegates
            .get(provider_type)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| CloudError::Provisioning {
                candidate: provider_type.to_string(),
                message: format!("no provisioning delegate for provider type {provider_type}"),
            })
    }

    pub fn provider_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.delegates.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl ProvisioningDelegate for Noop {
        fn provider_type(&self) -> &str {
            self.0
        }

        async fn provision(
            &self,
            _ctx: &ProvisionContext<'_>,
            _candidate: &CandidateService,
        ) -> Result<ProvisionOutcome> {
            Ok(ProvisionOutcome::new())
        }

        async fn deprovision(&self, _ctx: &ProvisionContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup_and_default() {
        let registry = DelegateRegistry::new()
            .register(Arc::new(Noop("openstack")))
            .register(Arc::new(Noop("kubernetes")));

        assert_eq!(registry.get("openstack").unwrap().provider_type(), "openstack");
        assert_eq!(registry.provider_types(), vec!["kubernetes", "openstack"]);

        let err = registry.get("aws").err().unwrap();
        assert!(err.is_retryable_on_next_candidate());

        let registry = registry.with_default(Arc::new(Noop("generic")));
        assert_eq!(registry.get("aws").unwrap().provider_type(), "generic");
    }
}
