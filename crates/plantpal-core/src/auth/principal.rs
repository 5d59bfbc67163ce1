use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Platform;

/// Signed-in end user of the mobile app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Signed-in administrator of the web dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProfile {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AdminProfile {
    /// Name shown in greetings, falling back to the email.
    pub fn display_name(&self) -> &str {
        if self.user_name.is_empty() {
            &self.email
        } else {
            &self.user_name
        }
    }
}

/// Backend ids arrive as integers or uuid strings depending on the table.
pub(crate) fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Identity of the signed-in actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(UserProfile),
    Admin(AdminProfile),
}

impl Principal {
    pub fn email(&self) -> &str {
        match self {
            Principal::User(u) => &u.email,
            Principal::Admin(a) => &a.email,
        }
    }

    /// Platform whose store can hold this principal.
    pub fn platform(&self) -> Platform {
        match self {
            Principal::User(_) => Platform::Mobile,
            Principal::Admin(_) => Platform::Web,
        }
    }

    /// JSON encoding of the inner profile, as stored under the principal key.
    pub(crate) fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Principal::User(u) => serde_json::to_string(u),
            Principal::Admin(a) => serde_json::to_string(a),
        }
    }

    pub(crate) fn from_json(platform: Platform, raw: &str) -> serde_json::Result<Self> {
        match platform {
            Platform::Mobile => serde_json::from_str(raw).map(Principal::User),
            Platform::Web => serde_json::from_str(raw).map(Principal::Admin),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(u) => write!(f, "{}", u.username.as_deref().unwrap_or(&u.email)),
            Principal::Admin(a) => write!(f, "{}", a.display_name()),
        }
    }
}

/// Access/refresh token pair. Opaque to this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens never show up in logs or panics.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// A principal together with its tokens. The only way to populate a session,
/// so a principal can never be recorded without both tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub principal: Principal,
    pub tokens: TokenPair,
}

impl SessionData {
    pub fn new(principal: Principal, tokens: TokenPair) -> Self {
        Self { principal, tokens }
    }
}
