//! Orchestration error taxonomy

use thiserror::Error;

/// Orchestration errors
///
/// The variants follow how the workflow recovers: resolution and selection
/// errors are fatal for a run, provisioning errors advance the candidate
/// iterator, cleanup errors are aggregated and credential errors are
/// absorbed by a single refresh.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Selection failed: {0}")]
    Selection(String),

    #[error("Provisioning failed on {candidate}: {message}")]
    Provisioning { candidate: String, message: String },

    #[error("All candidate cloud services exhausted: {0}")]
    Exhausted(String),

    #[error("Resource deprovisioning failed: {0}")]
    Deprovisioning(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Credential error: {0}")]
    Credential(#[from] AuthError),

    #[error("Deployment not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition for deployment {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Concurrent modification of deployment {0}")]
    Conflict(String),

    #[error("Deployment {0} was cancelled")]
    Cancelled(String),

    #[error("Deployment {id} exceeded its timeout of {minutes} minutes")]
    Timeout { id: String, minutes: u32 },

    #[error("State store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the workflow may recover by trying the next candidate
    pub fn is_retryable_on_next_candidate(&self) -> bool {
        matches!(self, CloudError::Provisioning { .. })
    }
}

/// Identity provider errors
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("No credentials available for {0}")]
    MissingCredentials(String),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;
