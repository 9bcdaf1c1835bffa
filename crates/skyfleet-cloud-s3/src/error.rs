//! S3 backend error types

use skyfleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Invalid S3 URL: {0}")]
    InvalidUrl(String),

    #[error("No S3 credentials for {0}")]
    MissingCredentials(String),

    #[error("Versioning could not be enabled for bucket {0}")]
    VersioningNotEnabled(String),

    #[error("S3 {operation} failed{}: {message}", code_suffix(.code))]
    Sdk {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Malformed S3 request: {0}")]
    Build(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl S3Error {
    pub fn code(&self) -> Option<&str> {
        match self {
            S3Error::Sdk { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_no_such_bucket(&self) -> bool {
        self.code() == Some("NoSuchBucket")
    }

    /// The endpoint rejected the credentials as expired
    pub fn is_auth_expired(&self) -> bool {
        matches!(self.code(), Some("ExpiredToken" | "TokenRefreshRequired"))
    }
}

impl From<S3Error> for CloudError {
    fn from(err: S3Error) -> Self {
        CloudError::Cleanup(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;
