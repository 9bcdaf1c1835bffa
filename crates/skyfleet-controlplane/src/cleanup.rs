//! Resource cleanup coordination

use skyfleet_cloud::{
    CallExecutor, CleanupBackend, CleanupReport, CleanupScope, DeleteOutcome, Deployment, TokenId,
};
use std::sync::Arc;
use std::time::Instant;

/// Best-effort teardown of a deployment's resources
///
/// Each live resource goes to the first registered backend that accepts it.
/// One failing resource never stops the others; the caller gets the
/// aggregated report.
#[derive(Clone, Default)]
pub struct CleanupCoordinator {
    backends: Vec<Arc<dyn CleanupBackend>>,
    executor: CallExecutor,
}

impl CleanupCoordinator {
    pub fn new(executor: CallExecutor) -> Self {
        Self {
            backends: Vec::new(),
            executor,
        }
    }

    pub fn register(mut self, backend: Arc<dyn CleanupBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    fn backend_for(&self, resource: &skyfleet_cloud::Resource) -> Option<&Arc<dyn CleanupBackend>> {
        self.backends.iter().find(|b| b.accepts(resource))
    }

    /// Tear down every live resource of `deployment`
    ///
    /// With `force` nothing is contacted and the report is empty.
    pub async fn cleanup(
        &self,
        deployment: &Deployment,
        identity: Option<&TokenId>,
        force: bool,
    ) -> CleanupReport {
        let started = Instant::now();
        let mut report = CleanupReport::new();

        if force {
            tracing::info!(deployment_id = %deployment.id, "Force delete, skipping resource cleanup");
            report.finish(started);
            return report;
        }

        for resource in deployment.live_resources() {
            let Some(backend) = self.backend_for(resource) else {
                if self
                    .backends
                    .iter()
                    .any(|b| b.resource_type() == resource.resource_type)
                {
                    tracing::info!(
                        deployment_id = %deployment.id,
                        resource = %resource.id,
                        resource_type = %resource.resource_type,
                        "Resource lacks the metadata needed for cleanup, skipping"
                    );
                }
                report.add_skipped(&resource.id);
                continue;
            };

            let outcome = self
                .executor
                .execute_with_client(
                    identity,
                    |token| {
                        let scope = CleanupScope {
                            deployment_id: deployment.id.clone(),
                            user_group: deployment.user_group.clone(),
                            token,
                        };
                        let backend = Arc::clone(backend);
                        async move { Ok(backend.delete(resource, &scope).await) }
                    },
                    |result: &Result<DeleteOutcome, skyfleet_cloud::AuthError>| {
                        matches!(result, Ok(outcome) if outcome.is_auth_expired())
                    },
                )
                .await
                .unwrap_or_else(|e| DeleteOutcome::failed(e.to_string()));

            match outcome {
                DeleteOutcome::Deleted => {
                    tracing::info!(deployment_id = %deployment.id, resource = %resource.id, "Resource deleted");
                    report.add_success(&resource.id);
                }
                DeleteOutcome::AlreadyAbsent => {
                    tracing::info!(deployment_id = %deployment.id, resource = %resource.id, "Resource already absent");
                    report.add_success(&resource.id);
                }
                DeleteOutcome::Failed { reason, .. } => {
                    tracing::warn!(
                        deployment_id = %deployment.id,
                        resource = %resource.id,
                        reason = %reason,
                        "Resource cleanup failed"
                    );
                    report.add_failure(&resource.id, reason);
                }
            }
        }

        report.finish(started);
        report
    }
}
