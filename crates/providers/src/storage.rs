//! S3-compatible durable storage.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use storyreel_core::capabilities::{ObjectStorage, StorageError};

/// Connection settings for the object store.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2); path-style addressing is used when set.
    pub endpoint: Option<String>,
    /// Public base URL objects are served from.
    pub public_url: String,
    /// Static credentials; the default AWS provider chain is used when absent.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Storage {
    pub async fn connect(config: S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "storyreel-static",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            public_url: config.public_url,
        }
    }

    pub fn public_url_for(&self, key: &str) -> String {
        public_url(&self.public_url, key)
    }
}

/// `{base}/{key}` with exactly one slash between them.
pub fn public_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload_buffer(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(key, size, content_type, "Object uploaded");
        Ok(self.public_url_for(key))
    }

    async fn download_file(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                reason: e.to_string(),
            })?
            .into_bytes();
        tokio::fs::write(local_path, &bytes).await?;
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(key, "Object deleted");
        Ok(())
    }
}
