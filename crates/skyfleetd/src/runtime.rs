//! Wiring of configuration into the control plane

use anyhow::Context;
use skyfleet_catalog::{
    build_http_client, CatalogResolver, ClientCredentials, FederationRegistry, Resolve, Weights,
};
use skyfleet_cloud::{CallExecutor, DelegateRegistry, DeploymentStore, FileStore, TokenId};
use skyfleet_cloud_s3::{S3BucketBackend, StaticCredentials};
use skyfleet_config::{Config, IdentityConfig};
use skyfleet_controlplane::{CleanupCoordinator, DeploymentService, Workflow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STATE_SUBDIR: &str = "skyfleet";

pub struct Runtime {
    pub service: DeploymentService,
    pub resolver: Arc<dyn Resolve>,
    pub cleanup: CleanupCoordinator,
}

/// Directory holding the state file
///
/// The command-line override wins over the configured directory; without
/// either the platform data directory is used.
pub fn state_dir(config: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = &config.store.state_dir {
        return Ok(dir.clone());
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(STATE_SUBDIR))
        .context("no state directory configured and no local data directory available")
}

/// Identity the operator acts as, if any
pub fn identity(
    config: &IdentityConfig,
    subject: Option<String>,
    organisation: Option<String>,
) -> Option<TokenId> {
    let subject = subject?;
    let issuer = config.issuer.clone().unwrap_or_default();
    let id = TokenId::new(issuer, subject);
    Some(match organisation {
        Some(org) => id.with_organisation(org),
        None => id,
    })
}

fn executor(client: &reqwest::Client, config: &IdentityConfig) -> anyhow::Result<CallExecutor> {
    if config.client_id.is_none() {
        tracing::info!("No identity client configured, catalog calls are anonymous");
        return Ok(CallExecutor::anonymous());
    }
    let tokens = ClientCredentials::new(client.clone(), config)?;
    Ok(CallExecutor::new(Arc::new(tokens)))
}

impl Runtime {
    pub fn build(config: &Config, state_dir: PathBuf) -> anyhow::Result<Self> {
        let client = build_http_client(&config.catalog)?;
        let executor = executor(&client, &config.identity)?;

        let registry = FederationRegistry::with_client(client, &config.catalog, executor.clone());
        let resolver: Arc<dyn Resolve> =
            Arc::new(CatalogResolver::new(registry, Weights::from(&config.ranking)));

        tracing::debug!(state_dir = %state_dir.display(), "Using file store");
        let store: Arc<dyn DeploymentStore> = Arc::new(FileStore::new(state_dir));

        let buckets = S3BucketBackend::new(
            Arc::new(StaticCredentials::from(&config.s3)),
            config.s3.region.clone(),
        );
        let cleanup = CleanupCoordinator::new(executor.clone()).register(Arc::new(buckets));

        // Provisioning delegates are registered by embedders; the operator
        // binary only drives status changes, cleanup and forced deletes.
        let workflow = Workflow::new(store, Arc::clone(&resolver), DelegateRegistry::new())
            .with_executor(executor)
            .with_cleanup(cleanup.clone());

        Ok(Self {
            service: DeploymentService::new(workflow, &config.workflow),
            resolver,
            cleanup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_dir_precedence() {
        let mut config = Config::default();
        config.store.state_dir = Some(PathBuf::from("/var/lib/skyfleet"));

        let dir = state_dir(&config, Some(Path::new("/tmp/override"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/override"));

        let dir = state_dir(&config, None).unwrap();
        assert_eq!(dir, PathBuf::from("/var/lib/skyfleet"));
    }

    #[test]
    fn test_identity_requires_subject() {
        let config = IdentityConfig {
            issuer: Some("https://iam.example.org/".to_string()),
            ..Default::default()
        };

        assert!(identity(&config, None, Some("research".to_string())).is_none());

        let id = identity(
            &config,
            Some("operator".to_string()),
            Some("research".to_string()),
        )
        .unwrap();
        assert_eq!(id.issuer, "https://iam.example.org/");
        assert_eq!(id.organisation.as_deref(), Some("research"));
    }

    #[tokio::test]
    async fn test_build_without_identity_client() {
        let temp = tempfile::tempdir().unwrap();
        let runtime = Runtime::build(&Config::default(), temp.path().to_path_buf()).unwrap();

        assert_eq!(runtime.cleanup.backend_count(), 1);
        assert!(runtime.service.list().await.unwrap().is_empty());
    }
}
