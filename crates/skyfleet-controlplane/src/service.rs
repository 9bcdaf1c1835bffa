//! Deployment service facade
//!
//! Validates an operation against the record, commits the in-progress
//! status, then runs the workflow on its own tokio task. Callers get the
//! committed record back immediately and may await the run via
//! [`RunHandle::wait`].

use crate::context::DeploymentExecutionContext;
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use skyfleet_cloud::{
    update_deployment, CloudError, Deployment, DeploymentStore, Result, ServiceType, Status,
    TokenId,
};
use skyfleet_config::WorkflowConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A new deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentRequest {
    pub template: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub service_types: Vec<ServiceType>,
    pub user_group: Option<String>,
    pub owner: Option<String>,
    pub callback: Option<String>,
    pub timeout_mins: Option<u32>,
}

impl DeploymentRequest {
    pub fn new(template: impl Into<String>, service_types: Vec<ServiceType>) -> Self {
        Self {
            template: template.into(),
            service_types,
            ..Default::default()
        }
    }

    pub fn with_user_group(mut self, user_group: impl Into<String>) -> Self {
        self.user_group = Some(user_group.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_timeout_mins(mut self, minutes: u32) -> Self {
        self.timeout_mins = Some(minutes);
        self
    }
}

/// Changes applied to an existing deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    pub template: Option<String>,
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
    /// Re-rank providers instead of staying on the chosen one
    pub reselect: bool,
    pub timeout_mins: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Run {
    Create,
    Update { reselect: bool },
    Delete { force: bool },
}

/// A workflow run in flight
pub struct RunHandle {
    /// Record as committed when the run was started
    pub deployment: Deployment,
    task: JoinHandle<()>,
    store: Arc<dyn DeploymentStore>,
}

impl RunHandle {
    pub fn id(&self) -> &str {
        &self.deployment.id
    }

    /// Wait for the run to settle and return the final record
    pub async fn wait(self) -> Result<Deployment> {
        self.task
            .await
            .map_err(|e| CloudError::Store(format!("workflow task for {} failed: {e}", self.deployment.id)))?;
        self.store.get(&self.deployment.id).await
    }
}

/// Entry point for create, update, delete and administrative operations
#[derive(Clone)]
pub struct DeploymentService {
    workflow: Arc<Workflow>,
    default_timeout_mins: u32,
}

impl DeploymentService {
    pub fn new(workflow: Workflow, config: &WorkflowConfig) -> Self {
        Self {
            workflow: Arc::new(workflow),
            default_timeout_mins: config.default_timeout_mins,
        }
    }

    fn store(&self) -> &dyn DeploymentStore {
        self.workflow.store().as_ref()
    }

    /// Record a new deployment and start creating it
    pub async fn submit(
        &self,
        request: DeploymentRequest,
        identity: Option<TokenId>,
    ) -> Result<RunHandle> {
        if request.service_types.is_empty() {
            return Err(CloudError::Selection(
                "a deployment must request at least one service type".to_string(),
            ));
        }

        let mut deployment = Deployment::new(request.template, request.service_types)
            .with_parameters(request.parameters)
            .with_timeout_mins(request.timeout_mins.unwrap_or(self.default_timeout_mins));
        deployment.owner = request.owner;
        deployment.user_group = request.user_group;
        deployment.callback = request.callback;

        let deployment = self.store().insert(deployment).await?;
        tracing::info!(deployment_id = %deployment.id, "Deployment submitted");
        Ok(self.spawn(deployment, identity, Run::Create))
    }

    pub async fn update(
        &self,
        id: &str,
        request: UpdateRequest,
        identity: Option<TokenId>,
    ) -> Result<RunHandle> {
        let deployment = update_deployment(self.store(), id, |d| {
            d.transition(Status::UpdateInProgress)?;
            if let Some(template) = &request.template {
                d.template = template.clone();
            }
            if let Some(parameters) = &request.parameters {
                d.parameters = parameters.clone();
            }
            if let Some(minutes) = request.timeout_mins {
                d.timeout_mins = Some(minutes);
            }
            d.status_reason = None;
            d.cancel_requested = false;
            Ok(())
        })
        .await?;

        tracing::info!(deployment_id = id, reselect = request.reselect, "Deployment update started");
        Ok(self.spawn(
            deployment,
            identity,
            Run::Update {
                reselect: request.reselect,
            },
        ))
    }

    /// Tear a deployment down
    ///
    /// `force` skips resource cleanup entirely and tolerates a failing
    /// deprovisioning step.
    pub async fn delete(&self, id: &str, force: bool, identity: Option<TokenId>) -> Result<RunHandle> {
        let deployment = update_deployment(self.store(), id, |d| {
            d.transition(Status::DeleteInProgress)?;
            d.status_reason = None;
            d.cancel_requested = false;
            Ok(())
        })
        .await?;

        tracing::info!(deployment_id = id, force, "Deployment deletion started");
        Ok(self.spawn(deployment, identity, Run::Delete { force }))
    }

    /// Administrative status override
    ///
    /// Only changes the record; use [`resume`](Self::resume) to run the
    /// workflow again for a deployment reset to an in-progress state.
    pub async fn reset(&self, id: &str, status: Status) -> Result<Deployment> {
        let deployment = update_deployment(self.store(), id, |d| {
            if !d.status.can_reset_to(status) {
                return Err(CloudError::InvalidTransition {
                    id: d.id.clone(),
                    from: d.status.to_string(),
                    to: status.to_string(),
                });
            }
            d.status_reason = Some(format!("Reset from {} to {}", d.status, status));
            d.status = status;
            d.cancel_requested = false;
            Ok(())
        })
        .await?;

        tracing::warn!(deployment_id = id, status = %status, "Deployment status reset");
        Ok(deployment)
    }

    /// Run the workflow for a deployment sitting in an in-progress state
    pub async fn resume(&self, id: &str, identity: Option<TokenId>) -> Result<RunHandle> {
        let deployment = self.store().get(id).await?;
        let run = match deployment.status {
            Status::CreateInProgress => Run::Create,
            Status::UpdateInProgress => Run::Update { reselect: false },
            Status::DeleteInProgress => Run::Delete { force: false },
            other => {
                return Err(CloudError::InvalidTransition {
                    id: deployment.id,
                    from: other.to_string(),
                    to: "an in-progress status".to_string(),
                });
            }
        };

        tracing::info!(deployment_id = id, status = %deployment.status, "Resuming deployment");
        Ok(self.spawn(deployment, identity, run))
    }

    /// Ask an in-flight run to stop at its next phase boundary
    pub async fn cancel(&self, id: &str) -> Result<Deployment> {
        let deployment = update_deployment(self.store(), id, |d| {
            if !d.status.is_in_progress() {
                return Err(CloudError::InvalidTransition {
                    id: d.id.clone(),
                    from: d.status.to_string(),
                    to: Status::failed(d.status.operation()).to_string(),
                });
            }
            d.cancel_requested = true;
            Ok(())
        })
        .await?;

        tracing::info!(deployment_id = id, "Cancellation requested");
        Ok(deployment)
    }

    pub async fn get(&self, id: &str) -> Result<Deployment> {
        self.store().get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Deployment>> {
        self.store().list().await
    }

    fn spawn(&self, deployment: Deployment, identity: Option<TokenId>, run: Run) -> RunHandle {
        let workflow = Arc::clone(&self.workflow);
        let mut ctx = DeploymentExecutionContext::new(deployment.id.clone(), identity);
        if let Some(minutes) = deployment.timeout_mins {
            ctx = ctx.with_timeout_mins(minutes);
        }

        let task = tokio::spawn(async move {
            let result = match run {
                Run::Create => workflow.run_create(&mut ctx).await,
                Run::Update { reselect } => workflow.run_update(&mut ctx, reselect).await,
                Run::Delete { force } => workflow.run_delete(&mut ctx, force).await,
            };
            if let Err(e) = result {
                tracing::debug!(deployment_id = %ctx.deployment_id, error = %e, "Run ended with an error");
            }
        });

        RunHandle {
            deployment,
            task,
            store: Arc::clone(self.workflow.store()),
        }
    }
}
