//! S3-compatible object storage for Skyfleet
//!
//! Buckets created on behalf of a deployment are recorded as
//! `tosca.nodes.indigo.S3Bucket` resources carrying `bucket_name` and
//! `s3_url` metadata. This crate creates them and tears them down again.
//!
//! Deleting a bucket empties it first (current objects, then every version
//! and delete marker). A bucket that no longer exists is reported as
//! already absent rather than as a failure.

pub mod backend;
pub mod bucket;
pub mod credentials;
pub mod error;

pub use backend::{S3BucketBackend, BUCKET_NAME_KEY, S3_BUCKET_NODE_TYPE, S3_URL_KEY};
pub use bucket::{check_bucket_name, BucketClient, BucketDeletion};
pub use credentials::{endpoint_host, CredentialSource, StaticCredentials};
pub use error::{Result, S3Error};
