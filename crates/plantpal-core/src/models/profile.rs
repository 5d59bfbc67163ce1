use serde::{Deserialize, Serialize};

/// Optional profile details; absent until the user fills them in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub city: Option<String>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub email: String,
    pub username: Option<String>,
    #[serde(default)]
    pub profile: ProfileDetails,
}

/// Changes to the signed-in admin. Empty fields are left untouched by the
/// backend; a new password requires the current one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminProfileUpdate {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}
