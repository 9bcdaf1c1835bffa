//! Cleanup backend contract

use crate::error::Result;
use crate::state::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of tearing down one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; counts as success
    AlreadyAbsent,
    Failed {
        reason: String,
        /// The backend rejected the caller's credential
        auth_expired: bool,
    },
}

impl DeleteOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        DeleteOutcome::Failed {
            reason: reason.into(),
            auth_expired: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent)
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            DeleteOutcome::Failed {
                auth_expired: true,
                ..
            }
        )
    }
}

/// Caller scope passed to cleanup backends
#[derive(Debug, Clone, Default)]
pub struct CleanupScope {
    pub deployment_id: String,
    pub user_group: Option<String>,
    /// Bearer token, `None` for anonymous calls
    pub token: Option<String>,
}

/// Teardown for one kind of resource
#[async_trait]
pub trait CleanupBackend: Send + Sync {
    /// Resource type tag handled by this backend
    fn resource_type(&self) -> &str;

    /// Metadata keys a resource must carry to be eligible
    fn required_keys(&self) -> &[&str];

    async fn create(&self, resource: &Resource, scope: &CleanupScope) -> Result<()>;

    /// Idempotent delete; a missing resource is [`DeleteOutcome::AlreadyAbsent`]
    async fn delete(&self, resource: &Resource, scope: &CleanupScope) -> DeleteOutcome;

    fn accepts(&self, resource: &Resource) -> bool {
        resource.resource_type == self.resource_type()
            && self
                .required_keys()
                .iter()
                .all(|key| resource.metadata.contains_key(*key))
    }
}

/// Aggregated result of a cleanup pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Resource ids torn down (or already absent)
    pub succeeded: Vec<String>,
    /// (resource id, reason)
    pub failed: Vec<(String, String)>,
    /// Resources no backend was eligible for
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, resource_id: impl Into<String>) {
        self.succeeded.push(resource_id.into());
    }

    pub fn add_failure(&mut self, resource_id: impl Into<String>, reason: impl Into<String>) {
        self.failed.push((resource_id.into(), reason.into()));
    }

    pub fn add_skipped(&mut self, resource_id: impl Into<String>) {
        self.skipped.push(resource_id.into());
    }

    pub fn finish(&mut self, started: Instant) {
        self.duration_ms = started.elapsed().as_millis() as u64;
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line summary of the failures, if any
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(
            self.failed
                .iter()
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
