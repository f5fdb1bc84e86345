use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

const SETTINGS_FILE: &str = "sonexa-settings.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Application settings
///
/// Persisted as JSON in the platform config directory. Unknown fields are
/// rejected on load so a stale or hand-edited file fails loudly instead of
/// silently dropping data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    /// Managed library root; a leading `~` is expanded before use
    pub local_library_path: String,
    /// Remote object store endpoint; empty means not configured
    pub remote_endpoint_url: String,
    pub remote_bucket: String,
    pub remote_region: String,
    pub auto_sync: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            local_library_path: "~/SonexaLibrary".to_string(),
            remote_endpoint_url: String::new(),
            remote_bucket: "sonexa-files".to_string(),
            remote_region: "us-east-1".to_string(),
            auto_sync: false,
            last_sync_at: None,
        }
    }
}

/// Settings store backed by a JSON file
///
/// Cloning is cheap; all clones share the same in-memory state and file.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
    inner: Arc<RwLock<AppSettings>>,
}

impl SettingsStore {
    /// Load settings from `config_dir`, creating defaults on first run.
    /// In debug builds a `.env` file can override the library path via
    /// `SONEXA_LIBRARY_PATH`.
    pub fn load(config_dir: &Path) -> Result<Self, SettingsError> {
        #[cfg(debug_assertions)]
        {
            let _ = dotenvy::dotenv();
        }

        std::fs::create_dir_all(config_dir)?;
        let path = config_dir.join(SETTINGS_FILE);

        #[allow(unused_mut)]
        let mut settings = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            AppSettings::default()
        };

        #[cfg(debug_assertions)]
        if let Ok(dev_path) = std::env::var("SONEXA_LIBRARY_PATH") {
            settings.local_library_path = dev_path;
        }

        Ok(SettingsStore {
            path,
            inner: Arc::new(RwLock::new(settings)),
        })
    }

    pub fn get(&self) -> AppSettings {
        self.inner.read().unwrap().clone()
    }

    /// Apply a mutation and persist the result
    pub fn update(
        &self,
        apply: impl FnOnce(&mut AppSettings),
    ) -> Result<AppSettings, SettingsError> {
        let mut guard = self.inner.write().unwrap();
        apply(&mut guard);
        std::fs::write(&self.path, serde_json::to_string_pretty(&*guard)?)?;
        Ok(guard.clone())
    }

    /// The expanded library root path
    pub fn library_root(&self) -> PathBuf {
        expand_home(&self.get().local_library_path)
    }
}

/// Expand the `~` home-directory shorthand
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.local_library_path, "~/SonexaLibrary");
        assert_eq!(settings.remote_bucket, "sonexa-files");
        assert!(!settings.auto_sync);
        assert!(settings.last_sync_at.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<AppSettings, _> =
            serde_json::from_str(r#"{"local_library_path": "/tmp/lib", "color_scheme": "mauve"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/SonexaLibrary"), home.join("SonexaLibrary"));
        }
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_update_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path()).unwrap();
        store
            .update(|s| s.remote_endpoint_url = "http://localhost:9000".to_string())
            .unwrap();

        let reloaded = SettingsStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.get().remote_endpoint_url, "http://localhost:9000");
    }
}
