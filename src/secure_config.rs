use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const SERVICE_NAME: &str = "sonexa";

/// Keyring entry holding the remote store credential blob
pub const REMOTE_CREDENTIALS_SECRET: &str = "remote_credentials";

#[derive(Error, Debug)]
pub enum SecureConfigError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Credential pair for the remote object store, stored as one JSON blob
/// under a single keyring entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// OS-keychain-backed secret store
///
/// Narrow get/set/delete-by-name contract; the keychain may prompt for a
/// password on first access.
#[derive(Clone, Debug, Default)]
pub struct SecureStore;

impl SecureStore {
    pub fn new() -> Self {
        SecureStore
    }

    pub fn get_secret(&self, name: &str) -> Result<Option<String>, SecureConfigError> {
        let entry = Entry::new(SERVICE_NAME, name)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecureConfigError::Keyring(e)),
        }
    }

    pub fn set_secret(&self, name: &str, value: &str) -> Result<(), SecureConfigError> {
        let entry = Entry::new(SERVICE_NAME, name)?;
        entry.set_password(value)?;
        Ok(())
    }

    /// Delete a secret; false when there was nothing to delete
    pub fn delete_secret(&self, name: &str) -> Result<bool, SecureConfigError> {
        let entry = Entry::new(SERVICE_NAME, name)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(SecureConfigError::Keyring(e)),
        }
    }

    pub fn get_remote_credentials(&self) -> Result<Option<RemoteCredentials>, SecureConfigError> {
        match self.get_secret(REMOTE_CREDENTIALS_SECRET)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| SecureConfigError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn store_remote_credentials(
        &self,
        credentials: &RemoteCredentials,
    ) -> Result<(), SecureConfigError> {
        let json = serde_json::to_string(credentials)
            .map_err(|e| SecureConfigError::Serialization(e.to_string()))?;
        self.set_secret(REMOTE_CREDENTIALS_SECRET, &json)?;
        info!("Stored remote store credentials");
        Ok(())
    }

    pub fn delete_remote_credentials(&self) -> Result<bool, SecureConfigError> {
        self.delete_secret(REMOTE_CREDENTIALS_SECRET)
    }
}
