//! Catalog error types

use skyfleet_cloud::{AuthError, CloudError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} was rejected as unauthorized")]
    Unauthorized { url: String },

    #[error("Request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("Missing record: {0}")]
    MissingRecord(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Credential(#[from] AuthError),
}

impl From<CatalogError> for CloudError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Credential(auth) => CloudError::Credential(auth),
            other => CloudError::Resolution(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
