use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStreamError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RemoteStoreError {
    #[error("S3 SDK error: {0}")]
    Sdk(String),
    #[error("ByteStream error: {0}")]
    ByteStream(#[from] ByteStreamError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Download error: {0}")]
    Download(String),
}

/// Connection settings for the remote object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>, // For MinIO/S3-compatible services
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<(), RemoteStoreError> {
        if self.bucket_name.trim().is_empty() {
            return Err(RemoteStoreError::Config(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(RemoteStoreError::Config(
                "Region cannot be empty".to_string(),
            ));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(RemoteStoreError::Config(
                "Access key ID cannot be empty".to_string(),
            ));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(RemoteStoreError::Config(
                "Secret access key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored object's identity after upload
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub key: String,
    pub url: String,
}

/// One entry of a remote listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub key: String,
    pub size: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Trait for remote store operations (allows mocking for tests)
///
/// The store owns no local state; every operation is keyed by the remote
/// object key. Uploads overwrite by key and deleting an absent key is
/// success, which is what makes queue retries safe to repeat.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<RemoteObject, RemoteStoreError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, RemoteStoreError>;

    /// Full listing under a prefix; implementations page internally until
    /// the listing is exhausted
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>, RemoteStoreError>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, key: &str) -> Result<bool, RemoteStoreError>;

    async fn bucket_exists(&self) -> Result<bool, RemoteStoreError>;

    async fn create_bucket(&self) -> Result<(), RemoteStoreError>;

    /// Public URL for a key, derivable without a round-trip
    fn public_url(&self, key: &str) -> String;
}

/// Production S3 remote store implementation
pub struct S3RemoteStore {
    client: Client,
    bucket_name: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3RemoteStore {
    /// Create a new S3 remote store client
    pub async fn new(config: RemoteConfig) -> Result<Self, RemoteStoreError> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None, // session_token
            None, // expiration
            "sonexa-remote-config",
        );

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        // Set custom endpoint if provided (for S3-compatible services)
        if let Some(endpoint) = config.endpoint_url.clone() {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let client = Client::new(&aws_config);

        Ok(S3RemoteStore {
            client,
            bucket_name: config.bucket_name,
            region: config.region,
            endpoint_url: config.endpoint_url,
        })
    }

}

#[async_trait::async_trait]
impl RemoteStore for S3RemoteStore {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<RemoteObject, RemoteStoreError> {
        debug!(key, bytes = data.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(data.to_vec().into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Sdk(format!("Put object failed: {}", e)))?;

        Ok(RemoteObject {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, RemoteStoreError> {
        debug!(key, "Downloading object");

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Sdk(format!("Get object failed: {}", e)))?;

        Ok(response.body.collect().await?.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>, RemoteStoreError> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| RemoteStoreError::Sdk(format!("List objects failed: {}", e)))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                entries.push(RemoteEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                    updated_at: object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<bool, RemoteStoreError> {
        // S3 delete is idempotent: deleting an absent key still succeeds
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Sdk(format!("Delete object failed: {}", e)))?;

        Ok(true)
    }

    async fn bucket_exists(&self) -> Result<bool, RemoteStoreError> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(RemoteStoreError::Sdk(format!("Head bucket failed: {}", e)))
                }
            }
        }
    }

    async fn create_bucket(&self) -> Result<(), RemoteStoreError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket_name);

        // us-east-1 is the implicit default and rejects an explicit constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = %self.bucket_name, "Created remote bucket");
                Ok(())
            }
            Err(e) => {
                let already_there = e.as_service_error().map(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                });
                if already_there == Some(true) {
                    Ok(())
                } else {
                    Err(RemoteStoreError::Sdk(format!(
                        "Create bucket failed: {}",
                        e
                    )))
                }
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket_name,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket_name, self.region, key
            ),
        }
    }
}

/// Remote store manager wrapping the concrete adapter behind a handle
#[derive(Clone)]
pub struct RemoteStoreManager {
    storage: std::sync::Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for RemoteStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreManager")
            .field("storage", &"<dyn RemoteStore>")
            .finish()
    }
}

impl RemoteStoreManager {
    /// Create a manager backed by the production S3 adapter
    pub async fn new(config: RemoteConfig) -> Result<Self, RemoteStoreError> {
        let storage = S3RemoteStore::new(config).await?;
        Ok(RemoteStoreManager {
            storage: std::sync::Arc::new(storage),
        })
    }

    /// Create a manager from any adapter implementation (used by tests)
    pub fn from_storage(storage: std::sync::Arc<dyn RemoteStore>) -> Self {
        RemoteStoreManager { storage }
    }

    /// Upload a local file under the given key, deriving the content type
    /// from the file extension
    pub async fn upload_file(
        &self,
        file_path: &Path,
        key: &str,
    ) -> Result<RemoteObject, RemoteStoreError> {
        let data = fs::read(file_path).await?;
        let content_type = crate::audio::content_type_for(file_path);
        self.storage.upload(key, &data, content_type).await
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>, RemoteStoreError> {
        self.storage.download(key).await
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>, RemoteStoreError> {
        self.storage.list(prefix).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, RemoteStoreError> {
        self.storage.delete(key).await
    }

    pub fn public_url(&self, key: &str) -> String {
        self.storage.public_url(key)
    }

    /// Idempotent bucket setup: create only when missing
    pub async fn ensure_bucket(&self) -> Result<(), RemoteStoreError> {
        if !self.storage.bucket_exists().await? {
            self.storage.create_bucket().await?;
        }
        Ok(())
    }
}
