//! Cleanup backend for object-storage buckets

use crate::bucket::{check_bucket_name, BucketClient, BucketDeletion};
use crate::credentials::{endpoint_host, CredentialSource};
use crate::error::{Result as S3Result, S3Error};
use async_trait::async_trait;
use skyfleet_cloud::{CleanupBackend, CleanupScope, DeleteOutcome, Resource, Result};
use std::sync::Arc;

/// Resource type tag of bucket nodes
pub const S3_BUCKET_NODE_TYPE: &str = "tosca.nodes.indigo.S3Bucket";
pub const BUCKET_NAME_KEY: &str = "bucket_name";
pub const S3_URL_KEY: &str = "s3_url";

const REQUIRED_KEYS: [&str; 2] = [BUCKET_NAME_KEY, S3_URL_KEY];

/// Creates and tears down buckets recorded as deployment resources
pub struct S3BucketBackend {
    credentials: Arc<dyn CredentialSource>,
    region: String,
}

impl S3BucketBackend {
    pub fn new(credentials: Arc<dyn CredentialSource>, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    fn bucket_of(resource: &Resource) -> S3Result<(&str, &str)> {
        match (
            resource.metadata_value(BUCKET_NAME_KEY),
            resource.metadata_value(S3_URL_KEY),
        ) {
            (Some(bucket), Some(url)) => Ok((bucket, url)),
            _ => Err(S3Error::Build(format!(
                "resource {} carries no bucket metadata",
                resource.id
            ))),
        }
    }

    async fn client(&self, s3_url: &str, scope: &CleanupScope) -> S3Result<BucketClient> {
        let host = endpoint_host(s3_url)?;
        let keys = self
            .credentials
            .credentials(host, scope.user_group.as_deref(), scope.token.as_deref())
            .await?;
        Ok(BucketClient::connect(s3_url, &self.region, &keys).await)
    }

    async fn try_delete(&self, resource: &Resource, scope: &CleanupScope) -> S3Result<BucketDeletion> {
        let (bucket, url) = Self::bucket_of(resource)?;
        self.client(url, scope).await?.delete_bucket(bucket).await
    }
}

#[async_trait]
impl CleanupBackend for S3BucketBackend {
    fn resource_type(&self) -> &str {
        S3_BUCKET_NODE_TYPE
    }

    fn required_keys(&self) -> &[&str] {
        &REQUIRED_KEYS
    }

    async fn create(&self, resource: &Resource, scope: &CleanupScope) -> Result<()> {
        let (bucket, url) = Self::bucket_of(resource)?;
        check_bucket_name(bucket)?;

        let client = self.client(url, scope).await?;
        client.create_bucket(bucket).await?;
        client.enable_versioning(bucket).await?;
        Ok(())
    }

    async fn delete(&self, resource: &Resource, scope: &CleanupScope) -> DeleteOutcome {
        match self.try_delete(resource, scope).await {
            Ok(BucketDeletion::Deleted) => DeleteOutcome::Deleted,
            Ok(BucketDeletion::NotFound) => DeleteOutcome::AlreadyAbsent,
            Err(e) => {
                tracing::error!(
                    deployment_id = %scope.deployment_id,
                    resource = %resource.id,
                    error = %e,
                    "Bucket deletion failed"
                );
                DeleteOutcome::Failed {
                    auth_expired: e.is_auth_expired(),
                    reason: e.to_string(),
                }
            }
        }
    }
}
