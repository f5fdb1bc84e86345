// In-memory remote store for tests. Stores objects in a map instead of
// talking to S3, and can be told to fail specific keys to exercise the
// per-item failure isolation paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use sonexa::cloud_storage::{RemoteEntry, RemoteObject, RemoteStore, RemoteStoreError};

struct StoredObject {
    data: Vec<u8>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
pub struct MockRemoteStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if it had been uploaded by another machine
    pub fn insert_object(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                updated_at: Utc::now(),
            },
        );
    }

    /// Make every operation against `key` fail
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn check_failure(&self, key: &str) -> Result<(), RemoteStoreError> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(RemoteStoreError::Sdk(format!(
                "Injected failure for {}",
                key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<RemoteObject, RemoteStoreError> {
        self.check_failure(key)?;
        self.insert_object(key, data);
        Ok(RemoteObject {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, RemoteStoreError> {
        self.check_failure(key)?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| RemoteStoreError::Download(format!("Object not found: {}", key)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>, RemoteStoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| RemoteEntry {
                key: key.clone(),
                size: object.data.len() as i64,
                updated_at: Some(object.updated_at),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, RemoteStoreError> {
        self.check_failure(key)?;
        Ok(self.objects.lock().unwrap().remove(key).is_some())
    }

    async fn bucket_exists(&self) -> Result<bool, RemoteStoreError> {
        Ok(true)
    }

    async fn create_bucket(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("mock://sonexa-files/{}", key)
    }
}
