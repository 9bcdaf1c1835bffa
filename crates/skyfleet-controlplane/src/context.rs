//! Per-run execution context

use crate::iterator::CandidateIterator;
use skyfleet_cloud::{CloudError, CloudProviderEndpoint, Result, TokenId};
use tokio::time::{Duration, Instant};

/// Workflow phase a run is in, reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Selection,
    Provisioning,
    Finalization,
    Deprovisioning,
    Cleanup,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Selection => "selection",
            Phase::Provisioning => "provisioning",
            Phase::Finalization => "finalization",
            Phase::Deprovisioning => "deprovisioning",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Transient state of one workflow run
///
/// Lives only for the duration of a run; everything that must survive a
/// restart is committed to the deployment record instead.
#[derive(Debug)]
pub struct DeploymentExecutionContext {
    pub deployment_id: String,
    pub identity: Option<TokenId>,
    pub endpoint: Option<CloudProviderEndpoint>,
    pub create_complete: bool,
    pub update_complete: bool,
    pub delete_complete: bool,
    pub phase: Phase,
    candidates: Option<CandidateIterator>,
    started: Instant,
    budget: Option<Duration>,
    timeout_mins: u32,
}

impl DeploymentExecutionContext {
    pub fn new(deployment_id: impl Into<String>, identity: Option<TokenId>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            identity,
            endpoint: None,
            create_complete: false,
            update_complete: false,
            delete_complete: false,
            phase: Phase::Selection,
            candidates: None,
            started: Instant::now(),
            budget: None,
            timeout_mins: 0,
        }
    }

    /// Bound the run to `minutes`, counted from now
    pub fn with_timeout_mins(mut self, minutes: u32) -> Self {
        self.started = Instant::now();
        self.budget = Some(Duration::from_secs(u64::from(minutes) * 60));
        self.timeout_mins = minutes;
        self
    }

    pub fn set_candidates(&mut self, candidates: CandidateIterator) {
        self.candidates = Some(candidates);
    }

    pub fn candidates(&self) -> Result<&CandidateIterator> {
        self.candidates
            .as_ref()
            .ok_or_else(|| no_candidates(&self.deployment_id))
    }

    pub fn candidates_mut(&mut self) -> Result<&mut CandidateIterator> {
        self.candidates
            .as_mut()
            .ok_or_else(|| no_candidates(&self.deployment_id))
    }

    pub fn timed_out(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Error raised once the budget is spent
    pub fn check_timeout(&self) -> Result<()> {
        if self.timed_out() {
            return Err(CloudError::Timeout {
                id: self.deployment_id.clone(),
                minutes: self.timeout_mins,
            });
        }
        Ok(())
    }
}

fn no_candidates(deployment_id: &str) -> CloudError {
    CloudError::Selection(format!("no candidates selected for deployment {deployment_id}"))
}
