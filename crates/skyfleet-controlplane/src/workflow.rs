//! Deployment state machine
//!
//! A run moves one deployment through `*_IN_PROGRESS` to either
//! `*_COMPLETE` or `*_FAILED`. Each phase commits its effects before the
//! next one starts, and cancellation and the run's time budget are checked
//! at every phase boundary.
//!
//! ```text
//! create:  select ─▶ provision ──(fail, next candidate)──┐
//!                        ▲                               │
//!                        └───────────────────────────────┘
//!                        │ ok
//!                        ▼
//!                    finalize ─▶ CREATE_COMPLETE
//!
//! any error ─▶ handle_error ─▶ *_FAILED
//! ```

use crate::cleanup::CleanupCoordinator;
use crate::context::{DeploymentExecutionContext, Phase};
use crate::iterator::CandidateIterator;
use crate::ranking::{self, CandidateFilter, MinimalCapabilities};
use skyfleet_catalog::Resolve;
use skyfleet_cloud::{
    update_deployment, CallExecutor, CandidateService, CloudError, DelegateRegistry, Deployment,
    DeploymentStore, Operation, ProvisionContext, ProvisionOutcome, Result, Status,
};
use std::sync::Arc;

/// Orchestrates create, update and delete runs
pub struct Workflow {
    store: Arc<dyn DeploymentStore>,
    resolver: Arc<dyn Resolve>,
    delegates: DelegateRegistry,
    cleanup: CleanupCoordinator,
    executor: CallExecutor,
    filter: Arc<dyn CandidateFilter>,
}

impl Workflow {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        resolver: Arc<dyn Resolve>,
        delegates: DelegateRegistry,
    ) -> Self {
        Self {
            store,
            resolver,
            delegates,
            cleanup: CleanupCoordinator::default(),
            executor: CallExecutor::anonymous(),
            filter: Arc::new(MinimalCapabilities),
        }
    }

    pub fn with_cleanup(mut self, cleanup: CleanupCoordinator) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Executor handed to delegates for their remote calls
    pub fn with_executor(mut self, executor: CallExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn CandidateFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<dyn Resolve> {
        &self.resolver
    }

    pub fn filter(&self) -> &dyn CandidateFilter {
        self.filter.as_ref()
    }

    #[tracing::instrument(skip_all, fields(deployment_id = %ctx.deployment_id))]
    pub async fn run_create(&self, ctx: &mut DeploymentExecutionContext) -> Result<Deployment> {
        let result = self.create(ctx).await;
        self.settle(ctx, Operation::Create, result).await
    }

    #[tracing::instrument(skip_all, fields(deployment_id = %ctx.deployment_id, reselect = reselect))]
    pub async fn run_update(
        &self,
        ctx: &mut DeploymentExecutionContext,
        reselect: bool,
    ) -> Result<Deployment> {
        let result = self.update(ctx, reselect).await;
        self.settle(ctx, Operation::Update, result).await
    }

    #[tracing::instrument(skip_all, fields(deployment_id = %ctx.deployment_id, force = force))]
    pub async fn run_delete(
        &self,
        ctx: &mut DeploymentExecutionContext,
        force: bool,
    ) -> Result<Deployment> {
        let result = self.delete(ctx, force).await;
        self.settle(ctx, Operation::Delete, result).await
    }

    async fn create(&self, ctx: &mut DeploymentExecutionContext) -> Result<Deployment> {
        let deployment = self.checkpoint(ctx, Operation::Create).await?;

        ctx.phase = Phase::Selection;
        let candidates = ranking::select(
            self.resolver.as_ref(),
            ctx.identity.as_ref(),
            deployment.user_group.as_deref(),
            &deployment.service_types,
            self.filter.as_ref(),
        )
        .await?;
        ctx.set_candidates(candidates);

        self.provision(ctx, Operation::Create).await?;
        self.finalize(ctx, Operation::Create).await
    }

    async fn update(
        &self,
        ctx: &mut DeploymentExecutionContext,
        reselect: bool,
    ) -> Result<Deployment> {
        let deployment = self.checkpoint(ctx, Operation::Update).await?;

        ctx.phase = Phase::Selection;
        let candidates = if reselect {
            ranking::select(
                self.resolver.as_ref(),
                ctx.identity.as_ref(),
                deployment.user_group.as_deref(),
                &deployment.service_types,
                self.filter.as_ref(),
            )
            .await?
        } else {
            let pinned = self.pinned_candidate(ctx, &deployment).await?;
            CandidateIterator::new(vec![pinned])?
        };
        ctx.set_candidates(candidates);

        self.provision(ctx, Operation::Update).await?;
        self.finalize(ctx, Operation::Update).await
    }

    /// Candidate for the service the deployment already lives on
    async fn pinned_candidate(
        &self,
        ctx: &DeploymentExecutionContext,
        deployment: &Deployment,
    ) -> Result<CandidateService> {
        let endpoint = deployment.endpoint.as_ref().ok_or_else(|| {
            CloudError::Resolution(format!(
                "deployment {} has no provider endpoint to update",
                deployment.id
            ))
        })?;

        let identity = ctx.identity.as_ref();
        let preferences = self
            .resolver
            .resolve_preferences(identity, deployment.user_group.as_deref())
            .await?;
        let capabilities = self
            .resolver
            .resolve_provider_capabilities(&endpoint.provider_id, &preferences.user_group_id, identity)
            .await?;

        ranking::pin_candidate(
            &preferences,
            &capabilities,
            &deployment.service_types,
            &endpoint.service_id,
        )
    }

    async fn delete(&self, ctx: &mut DeploymentExecutionContext, force: bool) -> Result<Deployment> {
        let deployment = self.checkpoint(ctx, Operation::Delete).await?;

        ctx.phase = Phase::Deprovisioning;
        ctx.endpoint = deployment.endpoint.clone();
        let mut deprovision_error = None;
        if let Some(endpoint) = &deployment.endpoint {
            let deprovisioned = match self.delegates.get(&endpoint.provider_type) {
                Ok(delegate) => {
                    let pctx = self.provision_context(ctx, &deployment);
                    delegate.deprovision(&pctx).await
                }
                Err(e) => Err(e),
            };
            match deprovisioned {
                Ok(()) => tracing::info!(provider = %endpoint.provider_id, "Deprovisioned"),
                Err(e) if force => {
                    tracing::warn!(provider = %endpoint.provider_id, error = %e, "Deprovisioning failed, continuing with force delete");
                    ctx.endpoint = None;
                }
                Err(e) => {
                    tracing::warn!(provider = %endpoint.provider_id, error = %e, "Deprovisioning failed, cleaning up resources anyway");
                    deprovision_error = Some(e);
                }
            }
        }

        // Cleanup runs whatever the deprovisioning outcome
        let deployment = self.checkpoint(ctx, Operation::Delete).await?;
        ctx.phase = Phase::Cleanup;
        let report = self
            .cleanup
            .cleanup(&deployment, ctx.identity.as_ref(), force)
            .await;
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Resource cleanup finished"
        );

        if !report.succeeded.is_empty() {
            update_deployment(self.store.as_ref(), &ctx.deployment_id, |d| {
                for id in &report.succeeded {
                    if let Some(resource) = d.resources.get_mut(id) {
                        resource.deleted = true;
                    }
                }
                Ok(())
            })
            .await?;
        }

        match (deprovision_error, report.failure_summary()) {
            (None, None) => {}
            (None, Some(summary)) => return Err(CloudError::Cleanup(summary)),
            (Some(e), None) => return Err(CloudError::Deprovisioning(e.to_string())),
            (Some(e), Some(summary)) => {
                return Err(CloudError::Deprovisioning(format!(
                    "{e}; resource cleanup also failed: {summary}"
                )));
            }
        }

        self.finalize(ctx, Operation::Delete).await
    }

    /// Try candidates in rank order until one provisions
    async fn provision(&self, ctx: &mut DeploymentExecutionContext, op: Operation) -> Result<()> {
        ctx.phase = Phase::Provisioning;
        loop {
            self.checkpoint(ctx, op).await?;

            let candidate = ctx.candidates()?.current().clone();
            let endpoint = candidate.to_endpoint();
            let deployment = update_deployment(self.store.as_ref(), &ctx.deployment_id, |d| {
                d.endpoint = Some(endpoint.clone());
                Ok(())
            })
            .await?;
            ctx.endpoint = Some(endpoint);

            tracing::info!(
                candidate = %candidate,
                position = ctx.candidates()?.position(),
                "Provisioning on candidate"
            );

            match self.attempt(ctx, &deployment, &candidate, op).await {
                Ok(outcome) => {
                    if !outcome.resources.is_empty() {
                        update_deployment(self.store.as_ref(), &ctx.deployment_id, |d| {
                            for resource in &outcome.resources {
                                d.add_resource(resource.clone());
                            }
                            Ok(())
                        })
                        .await?;
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable_on_next_candidate() => {
                    tracing::warn!(candidate = %candidate, error = %e, "Provisioning failed, trying next candidate");
                    match ctx.candidates_mut()?.advance() {
                        Ok(_) => {}
                        Err(CloudError::Exhausted(tried)) => {
                            return Err(CloudError::Exhausted(format!("{tried}; last error: {e}")));
                        }
                        Err(other) => return Err(other),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &DeploymentExecutionContext,
        deployment: &Deployment,
        candidate: &CandidateService,
        op: Operation,
    ) -> Result<ProvisionOutcome> {
        let delegate = self.delegates.get(&candidate.service.provider_type)?;
        let pctx = self.provision_context(ctx, deployment);
        match op {
            Operation::Update => delegate.update(&pctx, candidate).await,
            _ => delegate.provision(&pctx, candidate).await,
        }
    }

    fn provision_context<'a>(
        &'a self,
        ctx: &'a DeploymentExecutionContext,
        deployment: &'a Deployment,
    ) -> ProvisionContext<'a> {
        ProvisionContext {
            deployment,
            identity: ctx.identity.as_ref(),
            executor: &self.executor,
        }
    }

    /// Run the delegate's finalize step and mark the operation complete
    async fn finalize(&self, ctx: &mut DeploymentExecutionContext, op: Operation) -> Result<Deployment> {
        let deployment = self.checkpoint(ctx, op).await?;
        ctx.phase = Phase::Finalization;

        if let Some(endpoint) = &ctx.endpoint {
            let delegate = self.delegates.get(&endpoint.provider_type)?;
            delegate
                .finalize(&self.provision_context(ctx, &deployment))
                .await?;
        }

        let committed = update_deployment(self.store.as_ref(), &ctx.deployment_id, |d| {
            d.transition(Status::complete(op))?;
            d.status_reason = None;
            Ok(())
        })
        .await?;

        match op {
            Operation::Create => ctx.create_complete = true,
            Operation::Update => ctx.update_complete = true,
            Operation::Delete => ctx.delete_complete = true,
        }

        let record = serde_json::json!({
            "uuid": &committed.id,
            "status": committed.status.to_string(),
        });
        tracing::info!(record = %record, "Deployment completed");
        Ok(committed)
    }

    /// Phase boundary: honour cancellation and the time budget
    async fn checkpoint(&self, ctx: &DeploymentExecutionContext, op: Operation) -> Result<Deployment> {
        ctx.check_timeout()?;

        let deployment = self.store.get(&ctx.deployment_id).await?;
        if deployment.cancel_requested {
            return Err(CloudError::Cancelled(deployment.id));
        }
        let expected = Status::in_progress(op);
        if deployment.status != expected {
            return Err(CloudError::InvalidTransition {
                id: deployment.id,
                from: deployment.status.to_string(),
                to: expected.to_string(),
            });
        }
        Ok(deployment)
    }

    async fn settle(
        &self,
        ctx: &mut DeploymentExecutionContext,
        op: Operation,
        result: Result<Deployment>,
    ) -> Result<Deployment> {
        match result {
            Ok(deployment) => Ok(deployment),
            Err(e) => {
                self.handle_error(ctx, op, &e).await;
                Err(e)
            }
        }
    }

    /// Record a failed run; never fails itself
    async fn handle_error(&self, ctx: &mut DeploymentExecutionContext, op: Operation, error: &CloudError) {
        let reason = format!(
            "Error executing {op} on deployment {} during {}: {error}",
            ctx.deployment_id, ctx.phase
        );
        tracing::error!(phase = %ctx.phase, error = %error, "Deployment run failed");

        let clear_endpoint = op == Operation::Create;
        let recorded = update_deployment(self.store.as_ref(), &ctx.deployment_id, |d| {
            if d.status != Status::in_progress(op) {
                return Err(CloudError::InvalidTransition {
                    id: d.id.clone(),
                    from: d.status.to_string(),
                    to: Status::failed(op).to_string(),
                });
            }
            d.transition(Status::failed(op))?;
            d.status_reason = Some(reason.clone());
            if clear_endpoint {
                d.endpoint = None;
            }
            Ok(())
        })
        .await;

        match recorded {
            Ok(deployment) => {
                if clear_endpoint {
                    ctx.endpoint = None;
                }
                let record = serde_json::json!({
                    "uuid": &deployment.id,
                    "status": deployment.status.to_string(),
                    "status_reason": &deployment.status_reason,
                });
                tracing::info!(record = %record, "Deployment failed");
            }
            Err(secondary) => {
                tracing::error!(
                    error = %secondary,
                    original = %error,
                    "Could not record deployment failure"
                );
            }
        }
    }
}
