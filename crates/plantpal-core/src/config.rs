//! Client configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! selects the backend, the platform flavour (mobile user app or web admin
//! dashboard) and where the session is persisted.
//!
//! Configuration is stored at `~/.config/plantpal/config.json` and can be
//! overridden with `PLANTPAL_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "plantpal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used by the original clients during development.
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// HTTP request timeout in seconds.
/// Applies to every call the core makes, including token refresh.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_API_URL: &str = "PLANTPAL_API_URL";
const ENV_PLATFORM: &str = "PLANTPAL_PLATFORM";
const ENV_STORAGE: &str = "PLANTPAL_STORAGE";
const ENV_TIMEOUT_SECS: &str = "PLANTPAL_TIMEOUT_SECS";

/// Which client this core is running inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// End-user mobile app: principal is a user, keyed as `user`.
    Mobile,
    /// Admin web dashboard: principal is an admin, keyed as `admin`.
    #[default]
    Web,
}

impl Platform {
    /// Persisted key holding the principal.
    pub fn principal_key(self) -> &'static str {
        match self {
            Platform::Mobile => "user",
            Platform::Web => "admin",
        }
    }

    pub fn login_path(self) -> &'static str {
        match self {
            Platform::Mobile => "/api/login/",
            Platform::Web => "/api/admin_login/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Mobile => "mobile",
            Platform::Web => "web",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(Platform::Mobile),
            "web" => Ok(Platform::Web),
            other => Err(anyhow::anyhow!("Unknown platform: {}", other)),
        }
    }
}

/// Where the session record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub platform: Platform,
    pub storage: StorageBackend,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            platform: Platform::default(),
            storage: StorageBackend::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Config pointing at `api_base_url`, everything else defaulted.
    pub fn for_backend(api_base_url: impl Into<String>, platform: Platform) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            platform,
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `PLANTPAL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_PLATFORM) {
            match raw.parse() {
                Ok(platform) => self.platform = platform,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_PLATFORM),
            }
        }
        if let Some(raw) = lookup(ENV_STORAGE) {
            match raw.parse() {
                Ok(storage) => self.storage = storage,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_STORAGE),
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring {}", ENV_TIMEOUT_SECS),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Absolute URL for a backend path such as `/api/login/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session for this platform.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(self.platform.as_str()))
    }
}
