//! Access keys for S3 endpoints

use crate::error::{Result, S3Error};
use async_trait::async_trait;
use skyfleet_config::{S3Config, S3Credentials};
use std::collections::HashMap;

/// Endpoint host of an S3 URL (`https://s3.example.org:8443/` -> `s3.example.org:8443`)
pub fn endpoint_host(s3_url: &str) -> Result<&str> {
    let (_, rest) = s3_url
        .split_once("://")
        .ok_or_else(|| S3Error::InvalidUrl(s3_url.to_string()))?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(S3Error::InvalidUrl(s3_url.to_string()));
    }
    Ok(host)
}

/// Looks up access keys for an endpoint on behalf of a user group
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(
        &self,
        host: &str,
        user_group: Option<&str>,
        token: Option<&str>,
    ) -> Result<S3Credentials>;
}

/// Credentials read from the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    by_host: HashMap<String, S3Credentials>,
}

impl StaticCredentials {
    pub fn new(by_host: HashMap<String, S3Credentials>) -> Self {
        Self { by_host }
    }
}

impl From<&S3Config> for StaticCredentials {
    fn from(config: &S3Config) -> Self {
        Self::new(config.credentials.clone())
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials(
        &self,
        host: &str,
        _user_group: Option<&str>,
        _token: Option<&str>,
    ) -> Result<S3Credentials> {
        self.by_host
            .get(host)
            .cloned()
            .ok_or_else(|| S3Error::MissingCredentials(host.to_string()))
    }
}
