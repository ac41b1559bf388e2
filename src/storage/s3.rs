//! S3-compatible object storage backend (feature `s3-storage`).
//!
//! Works with AWS S3, MinIO, Cloudflare R2, DigitalOcean Spaces, and any
//! other S3-compatible service.

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{ObjectStorage, StorageError, StorageResult};
use crate::config::S3StorageConfig;

pub struct S3ObjectStorage {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStorage {
    pub async fn new(config: S3StorageConfig) -> StorageResult<Self> {
        info!(bucket = %config.bucket, "Initializing S3 object storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "offboard-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { config, client })
    }

    /// Strip the configured key prefix from a full S3 key.
    fn logical_key(&self, full_key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .unwrap_or(full_key)
                .to_string(),
            None => full_key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full_prefix = self.config.object_key(prefix);
        debug!(prefix = %full_prefix, bucket = %self.config.bucket, "Listing objects");

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                error!(error = %e, "Failed to list objects in S3");
                StorageError::S3(e.to_string())
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(self.logical_key(key));
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.config.object_key(key);
        debug!(key = %full_key, "Deleting object from S3");

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete object from S3");
                StorageError::S3(e.to_string())
            })?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
