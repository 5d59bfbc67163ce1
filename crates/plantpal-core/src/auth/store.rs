use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::principal::{Principal, SessionData, TokenPair};
use crate::config::{Config, Platform, StorageBackend};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name; the account is the platform's principal key.
const KEYRING_SERVICE: &str = "plantpal";

/// Durable storage for the current session.
///
/// `save` and `clear` must touch the principal and both tokens as one unit.
/// `load` returns `None` for anything short of a complete record.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionData>>;
    fn save(&self, data: &SessionData) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Build the store selected by the configuration.
pub fn store_for(config: &Config) -> Result<Box<dyn SessionStore>> {
    Ok(match config.storage {
        StorageBackend::File => Box::new(FileSessionStore::new(config.platform, config.cache_dir()?)),
        StorageBackend::Keyring => Box::new(KeyringSessionStore::new(config.platform)),
    })
}

/// On-disk mirror of a session: the three fixed keys the original clients
/// used, with the principal held as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedRecord(BTreeMap<String, String>);

impl PersistedRecord {
    pub fn from_session(platform: Platform, data: &SessionData) -> Result<Self> {
        if data.principal.platform() != platform {
            anyhow::bail!(
                "Cannot store a {} principal in the {} session store",
                data.principal.platform().as_str(),
                platform.as_str()
            );
        }
        let principal = data
            .principal
            .to_json()
            .context("Failed to encode principal")?;

        let mut keys = BTreeMap::new();
        keys.insert(platform.principal_key().to_string(), principal);
        keys.insert(ACCESS_TOKEN_KEY.to_string(), data.tokens.access.clone());
        keys.insert(REFRESH_TOKEN_KEY.to_string(), data.tokens.refresh.clone());
        Ok(Self(keys))
    }

    /// Raw key/value pairs, for stores seeded by hand.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Rebuild the session, or `None` if any key is missing, empty or
    /// unparseable.
    pub fn to_session(&self, platform: Platform) -> Option<SessionData> {
        let principal = self.non_empty(platform.principal_key())?;
        let access = self.non_empty(ACCESS_TOKEN_KEY)?;
        let refresh = self.non_empty(REFRESH_TOKEN_KEY)?;

        let principal = match Principal::from_json(platform, principal) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Stored principal is not valid JSON");
                return None;
            }
        };
        Some(SessionData::new(principal, TokenPair::new(access, refresh)))
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

// ============================================================================
// File store
// ============================================================================

/// JSON file in the cache directory, replaced atomically on every save.
pub struct FileSessionStore {
    platform: Platform,
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(platform: Platform, dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            dir: dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", SESSION_FILE))
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to remove unusable session file");
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Session file is unreadable, starting logged out");
                self.discard(&path);
                return Ok(None);
            }
        };
        let record: PersistedRecord = match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Session file is corrupt, starting logged out");
                self.discard(&path);
                return Ok(None);
            }
        };

        match record.to_session(self.platform) {
            Some(data) => Ok(Some(data)),
            None => {
                warn!("Session file is incomplete, starting logged out");
                self.discard(&path);
                Ok(None)
            }
        }
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let record = PersistedRecord::from_session(self.platform, data)?;
        std::fs::create_dir_all(&self.dir).context("Failed to create session directory")?;

        // Write beside the target then rename, so a crash leaves either the
        // old record or the new one.
        let temp = self.temp_path();
        let contents = serde_json::to_string_pretty(&record)?;
        std::fs::write(&temp, contents).context("Failed to write session file")?;
        std::fs::rename(&temp, self.path()).context("Failed to replace session file")?;
        debug!(path = %self.path().display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for path in [self.path(), self.temp_path()] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Keyring store
// ============================================================================

/// Whole record as a single OS keychain secret.
pub struct KeyringSessionStore {
    platform: Platform,
    service: String,
}

impl KeyringSessionStore {
    pub fn new(platform: Platform) -> Self {
        Self::with_service(KEYRING_SERVICE, platform)
    }

    /// Store under a different keychain service name.
    pub fn with_service(service: impl Into<String>, platform: Platform) -> Self {
        Self {
            platform,
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, self.platform.principal_key())
            .context("Failed to create keyring entry")
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session from keychain"),
        };

        let data = serde_json::from_str::<PersistedRecord>(&secret)
            .ok()
            .and_then(|record| record.to_session(self.platform));
        if data.is_none() {
            warn!("Keychain session is unusable, starting logged out");
            self.clear()?;
        }
        Ok(data)
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let record = PersistedRecord::from_session(self.platform, data)?;
        let secret = serde_json::to_string(&record)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// In-process store. Survives as long as the value does.
#[derive(Default)]
pub struct MemorySessionStore {
    platform: Platform,
    record: Mutex<Option<PersistedRecord>>,
}

impl MemorySessionStore {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            record: Mutex::new(None),
        }
    }

    /// Store pre-seeded with a raw record, complete or not.
    pub fn with_record(platform: Platform, record: PersistedRecord) -> Self {
        Self {
            platform,
            record: Mutex::new(Some(record)),
        }
    }

    /// Current raw record, if any.
    pub fn record(&self) -> Option<PersistedRecord> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionData>> {
        let mut slot = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        let data = slot.as_ref().and_then(|r| r.to_session(self.platform));
        if data.is_none() && slot.is_some() {
            *slot = None;
        }
        Ok(data)
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let record = PersistedRecord::from_session(self.platform, data)?;
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
