use serde::{Deserialize, Serialize};

use crate::auth::principal::id_as_string;

/// Registered end user as listed on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    /// Signup timestamp as the backend sends it.
    #[serde(default, alias = "date_joined")]
    pub created_at: String,
    pub city: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

impl UserAccount {
    pub fn display_name(&self) -> &str {
        if self.user_name.is_empty() {
            &self.user_email
        } else {
            &self.user_name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub date_submitted: String,
}
