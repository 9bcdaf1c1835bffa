#![allow(dead_code)]

use async_trait::async_trait;
use skyfleet_catalog::{PreferenceModel, Priority, Resolve};
use skyfleet_cloud::{
    AuthError, CandidateService, CleanupBackend, CleanupScope, CloudError, CloudService,
    ComputeDetails, DelegateRegistry, DeleteOutcome, Deployment, DeploymentStore, Flavor, Image,
    MemoryStore, ProviderCapabilities, ProvisionContext, ProvisionOutcome, ProvisioningDelegate,
    Resource, Result, ServiceDetails, ServiceType, Status, TokenId, TokenProvider,
};
use skyfleet_config::WorkflowConfig;
use skyfleet_controlplane::{CleanupCoordinator, DeploymentService, Workflow};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const PROVIDER_TYPE: &str = "openstack";
pub const BUCKET_TYPE: &str = "bucket";

pub fn compute_service(provider: &str) -> CloudService {
    CloudService {
        id: format!("{provider}-nova"),
        name: "nova".to_string(),
        endpoint: format!("https://{}.example.org:8774", provider.to_lowercase()),
        service_type: ServiceType::Compute,
        provider_id: provider.to_string(),
        provider_type: PROVIDER_TYPE.to_string(),
        public: true,
        tenant: "skyfleet".to_string(),
        region: "RegionOne".to_string(),
        hostname: Some(format!("{}.example.org", provider.to_lowercase())),
        details: ServiceDetails::Compute(ComputeDetails {
            images: vec![Image {
                id: "img-1".to_string(),
                name: "ubuntu-24.04".to_string(),
                architecture: Some("x86_64".to_string()),
                os_type: Some("linux".to_string()),
                os_distro: Some("ubuntu".to_string()),
                os_version: Some("24.04".to_string()),
                gpu_driver: false,
                cuda_support: false,
            }],
            flavors: vec![Flavor {
                id: "flv-1".to_string(),
                name: "m1.small".to_string(),
                ram: 2048.0,
                vcpus: 1,
                disk: 20.0,
                gpus: 0,
                gpu_vendor: None,
                gpu_model: None,
                infiniband: false,
            }],
            ..Default::default()
        }),
    }
}

/// Resolver answering from fixed snapshots
pub struct FakeResolver {
    pub preferences: PreferenceModel,
    pub capabilities: BTreeMap<String, ProviderCapabilities>,
    pub preference_calls: AtomicUsize,
}

impl FakeResolver {
    /// One compute service per provider, weighted as given
    pub fn with_providers(providers: &[(&str, f64)]) -> Self {
        let mut priorities = Vec::new();
        let mut capabilities = BTreeMap::new();
        for (provider, weight) in providers {
            let service = compute_service(provider);
            priorities.push(Priority {
                sla_id: format!("sla-{provider}"),
                service_id: service.id.clone(),
                provider_id: provider.to_string(),
                weight: *weight,
            });
            capabilities.insert(
                provider.to_string(),
                ProviderCapabilities {
                    provider_id: provider.to_string(),
                    provider_name: format!("{provider} cloud"),
                    services: BTreeMap::from([(service.id.clone(), service)]),
                },
            );
        }

        Self {
            preferences: PreferenceModel {
                user_group_id: "ug-1".to_string(),
                user_group_name: "research".to_string(),
                priorities: BTreeMap::from([(ServiceType::Compute, priorities)]),
                slas: Vec::new(),
            },
            capabilities,
            preference_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Resolve for FakeResolver {
    async fn resolve_preferences(
        &self,
        _identity: Option<&TokenId>,
        _user_group: Option<&str>,
    ) -> Result<PreferenceModel> {
        self.preference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.preferences.clone())
    }

    async fn resolve_provider_capabilities(
        &self,
        provider_id: &str,
        _user_group_id: &str,
        _identity: Option<&TokenId>,
    ) -> Result<ProviderCapabilities> {
        self.capabilities
            .get(provider_id)
            .cloned()
            .ok_or_else(|| CloudError::Resolution(format!("unknown provider {provider_id}")))
    }
}

/// Delegate whose outcome is scripted per provider
#[derive(Default)]
pub struct ScriptedDelegate {
    pub failing: Mutex<HashSet<String>>,
    /// Providers tried, in order, across provision and update
    pub attempts: Mutex<Vec<String>>,
    pub updates: AtomicUsize,
    pub deprovisions: AtomicUsize,
    pub finalizes: AtomicUsize,
    pub fail_deprovision: bool,
    /// Resources recorded by every successful provisioning
    pub resources: Vec<Resource>,
    /// Signalled when a provisioning attempt starts
    pub entered: Arc<Notify>,
    /// When set, provisioning waits for this before returning
    pub gate: Option<Arc<Notify>>,
    /// Simulated provisioning time
    pub delay: Option<Duration>,
}

impl ScriptedDelegate {
    pub fn failing_on(providers: &[&str]) -> Self {
        Self {
            failing: Mutex::new(providers.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    async fn run(&self, candidate: &CandidateService) -> Result<ProvisionOutcome> {
        self.attempts
            .lock()
            .unwrap()
            .push(candidate.provider_id.clone());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&candidate.provider_id) {
            return Err(CloudError::Provisioning {
                candidate: candidate.provider_id.clone(),
                message: "quota exceeded".to_string(),
            });
        }
        Ok(self
            .resources
            .iter()
            .cloned()
            .fold(ProvisionOutcome::new(), ProvisionOutcome::with_resource))
    }
}

#[async_trait]
impl ProvisioningDelegate for ScriptedDelegate {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE
    }

    async fn provision(
        &self,
        _ctx: &ProvisionContext<'_>,
        candidate: &CandidateService,
    ) -> Result<ProvisionOutcome> {
        self.run(candidate).await
    }

    async fn update(
        &self,
        _ctx: &ProvisionContext<'_>,
        candidate: &CandidateService,
    ) -> Result<ProvisionOutcome> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.run(candidate).await
    }

    async fn deprovision(&self, _ctx: &ProvisionContext<'_>) -> Result<()> {
        self.deprovisions.fetch_add(1, Ordering::SeqCst);
        if self.fail_deprovision {
            return Err(CloudError::Provisioning {
                candidate: "deprovision".to_string(),
                message: "endpoint unreachable".to_string(),
            });
        }
        Ok(())
    }

    async fn finalize(&self, _ctx: &ProvisionContext<'_>) -> Result<()> {
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cleanup backend remembering what it tore down
#[derive(Default)]
pub struct RecordingBackend {
    pub deleted: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    pub failing: HashSet<String>,
}

impl RecordingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CleanupBackend for RecordingBackend {
    fn resource_type(&self) -> &str {
        BUCKET_TYPE
    }

    fn required_keys(&self) -> &[&str] {
        &["bucket_name"]
    }

    async fn create(&self, _resource: &Resource, _scope: &CleanupScope) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, resource: &Resource, _scope: &CleanupScope) -> DeleteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = resource
            .metadata_value("bucket_name")
            .unwrap_or_default()
            .to_string();
        if self.failing.contains(&name) {
            return DeleteOutcome::failed("AccessDenied");
        }

        let mut deleted = self.deleted.lock().unwrap();
        if deleted.contains(&name) {
            return DeleteOutcome::AlreadyAbsent;
        }
        deleted.push(name);
        DeleteOutcome::Deleted
    }
}

pub fn bucket(name: &str) -> Resource {
    Resource::new(BUCKET_TYPE).with_metadata("bucket_name", name)
}

/// Token source handing out a fixed token
pub struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self, _id: &TokenId) -> std::result::Result<String, AuthError> {
        Ok("token".to_string())
    }

    async fn refresh(&self, _id: &TokenId) -> std::result::Result<String, AuthError> {
        Ok("token".to_string())
    }
}

pub fn identity() -> TokenId {
    TokenId::new("https://iam.example.org/", "operator").with_organisation("research")
}

/// In-memory store keeping every committed status
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    history: Mutex<Vec<(String, Status)>>,
}

impl RecordingStore {
    /// Statuses committed for one deployment, oldest first
    pub fn statuses(&self, id: &str) -> Vec<Status> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn record(&self, deployment: &Deployment) {
        self.history
            .lock()
            .unwrap()
            .push((deployment.id.clone(), deployment.status));
    }
}

#[async_trait]
impl DeploymentStore for RecordingStore {
    async fn insert(&self, deployment: Deployment) -> Result<Deployment> {
        let inserted = self.inner.insert(deployment).await?;
        self.record(&inserted);
        Ok(inserted)
    }

    async fn get(&self, id: &str) -> Result<Deployment> {
        self.inner.get(id).await
    }

    async fn commit(&self, deployment: &Deployment) -> Result<Deployment> {
        let committed = self.inner.commit(deployment).await?;
        self.record(&committed);
        Ok(committed)
    }

    async fn list(&self) -> Result<Vec<Deployment>> {
        self.inner.list().await
    }
}

/// Service over an in-memory store with the given collaborators
pub struct Harness {
    pub service: DeploymentService,
    pub store: Arc<RecordingStore>,
    pub resolver: Arc<FakeResolver>,
    pub delegate: Arc<ScriptedDelegate>,
    pub backend: Arc<RecordingBackend>,
}

impl Harness {
    pub fn new(resolver: FakeResolver, delegate: ScriptedDelegate) -> Self {
        Self::with_backend(resolver, delegate, RecordingBackend::default())
    }

    pub fn with_backend(
        resolver: FakeResolver,
        delegate: ScriptedDelegate,
        backend: RecordingBackend,
    ) -> Self {
        let store = Arc::new(RecordingStore::default());
        let resolver = Arc::new(resolver);
        let delegate = Arc::new(delegate);
        let backend = Arc::new(backend);

        let executor = skyfleet_cloud::CallExecutor::new(Arc::new(StaticTokens));
        let workflow = Workflow::new(
            store.clone() as Arc<dyn DeploymentStore>,
            resolver.clone() as Arc<dyn Resolve>,
            DelegateRegistry::new().register(delegate.clone() as Arc<dyn ProvisioningDelegate>),
        )
        .with_executor(executor.clone())
        .with_cleanup(
            CleanupCoordinator::new(executor).register(backend.clone() as Arc<dyn CleanupBackend>),
        );

        Self {
            service: DeploymentService::new(workflow, &WorkflowConfig::default()),
            store,
            resolver,
            delegate,
            backend,
        }
    }
}
