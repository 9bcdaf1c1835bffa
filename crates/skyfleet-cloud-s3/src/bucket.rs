//! Bucket operations against an S3-compatible endpoint

use crate::error::{Result, S3Error};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketVersioningStatus, Delete, Error as ObjectError, ObjectIdentifier, VersioningConfiguration,
};
use skyfleet_config::S3Credentials;

const MAX_NAME_LEN: usize = 63;
const RESERVED_SUFFIXES: [&str; 2] = ["-s3alias", "--ol-s3"];

/// Check a bucket name against the AWS naming rules
///
/// Lowercase letters, digits, dots and hyphens; ends with a letter or
/// digit; no consecutive dots; no reserved access-point suffix.
pub fn check_bucket_name(name: &str) -> Result<()> {
    let invalid = |why: &str| Err(S3Error::InvalidBucketName(format!("{name}: {why}")));

    if name.len() < 2 || name.len() > MAX_NAME_LEN {
        return invalid("length must be between 2 and 63");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }
    if !name
        .bytes()
        .last()
        .is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return invalid("must end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("consecutive dots are not allowed");
    }
    if RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return invalid("reserved suffix");
    }
    Ok(())
}

fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> S3Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    S3Error::Sdk {
        operation,
        code: err.code().map(str::to_string),
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn describe_delete_errors(errors: &[ObjectError]) -> Vec<String> {
    errors
        .iter()
        .map(|e| {
            format!(
                "{} ({}): {}",
                e.key().unwrap_or("<unknown key>"),
                e.code().unwrap_or("<no code>"),
                e.message().unwrap_or_default()
            )
        })
        .collect()
}

/// Result of deleting a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketDeletion {
    Deleted,
    NotFound,
}

/// Client for one S3 endpoint
#[derive(Clone)]
pub struct BucketClient {
    client: aws_sdk_s3::Client,
}

impl BucketClient {
    /// Connect with static keys, path-style addressing
    pub async fn connect(endpoint: &str, region: &str, credentials: &S3Credentials) -> Self {
        let keys = Credentials::new(
            &credentials.access_key,
            &credentials.secret_key,
            None,
            None,
            "skyfleet",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(keys)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("CreateBucket", e))?;
        tracing::info!(bucket, "Bucket created");
        Ok(())
    }

    /// Enable versioning and read the setting back
    pub async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("PutBucketVersioning", e))?;

        let current = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketVersioning", e))?;

        if current.status() != Some(&BucketVersioningStatus::Enabled) {
            return Err(S3Error::VersioningNotEnabled(bucket.to_string()));
        }
        tracing::info!(bucket, "Versioning enabled");
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, objects: Vec<ObjectIdentifier>) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| S3Error::Build(e.to_string()))?;
        let response = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObjects", e))?;
        for failure in describe_delete_errors(response.errors()) {
            tracing::warn!(bucket, failure = %failure, "Object was not deleted");
        }
        Ok(())
    }

    fn identifier(key: Option<&str>, version_id: Option<&str>) -> Result<ObjectIdentifier> {
        ObjectIdentifier::builder()
            .set_key(key.map(str::to_string))
            .set_version_id(version_id.map(str::to_string))
            .build()
            .map_err(|e| S3Error::Build(e.to_string()))
    }

    /// Delete every object version and delete marker
    ///
    /// Unversioned objects are listed with a `null` version id, so one
    /// paginated version listing covers current objects as well.
    async fn empty_bucket(&self, bucket: &str) -> Result<()> {
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListObjectVersions", e))?;

            let versions = page
                .versions()
                .iter()
                .map(|v| Self::identifier(v.key(), v.version_id()));
            let markers = page
                .delete_markers()
                .iter()
                .map(|m| Self::identifier(m.key(), m.version_id()));
            let batch = versions.chain(markers).collect::<Result<Vec<_>>>()?;
            self.delete_objects(bucket, batch).await?;

            if !page.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = page.next_key_marker().map(str::to_string);
            version_marker = page.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Remove objects, versions and delete markers, then the bucket
    pub async fn delete_bucket(&self, bucket: &str) -> Result<BucketDeletion> {
        tracing::info!(bucket, "Deleting bucket");

        let result: Result<()> = async {
            self.empty_bucket(bucket).await?;
            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| sdk_error("DeleteBucket", e))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(bucket, "Bucket deleted");
                Ok(BucketDeletion::Deleted)
            }
            Err(e) if e.is_no_such_bucket() => {
                tracing::warn!(bucket, "Bucket was not found");
                Ok(BucketDeletion::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bucket_names() {
        for name in ["my-bucket", "data.backup.2024", "ab", "a1-b2.c3"] {
            assert!(check_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        let too_long = "a".repeat(64);
        for name in [
            "",
            "a",
            too_long.as_str(),
            "My-Bucket",
            "bucket_name",
            "bucket-",
            "bucket.",
            "my..bucket",
            "data-s3alias",
            "data--ol-s3",
        ] {
            assert!(
                matches!(check_bucket_name(name), Err(S3Error::InvalidBucketName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_describe_delete_errors() {
        let errors = vec![
            ObjectError::builder()
                .key("logs/1.txt")
                .code("AccessDenied")
                .message("Access Denied")
                .build(),
            ObjectError::builder().build(),
        ];

        assert_eq!(
            describe_delete_errors(&errors),
            vec![
                "logs/1.txt (AccessDenied): Access Denied".to_string(),
                "<unknown key> (<no code>): ".to_string(),
            ]
        );
    }

    #[test]
    fn test_not_found_classification() {
        let err = S3Error::Sdk {
            operation: "DeleteBucket",
            code: Some("NoSuchBucket".to_string()),
            message: "gone".to_string(),
        };
        assert!(err.is_no_such_bucket());
        assert!(!err.is_auth_expired());
        assert_eq!(err.to_string(), "S3 DeleteBucket failed (NoSuchBucket): gone");
    }
}
