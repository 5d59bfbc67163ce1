//! Typed calls for the backend's authenticated resources.

use reqwest::Method;
use tracing::debug;

use super::{ApiClient, ApiError};
use crate::auth::AdminProfile;
use crate::models::{AdminProfileUpdate, Feedback, Plant, Profile, TermsVersion, UserAccount};

impl ApiClient {
    /// Fetch the profile of a user
    pub async fn fetch_profile(&self, email: &str) -> Result<Profile, ApiError> {
        let email = email.trim().to_lowercase();
        self.get_json(&format!("/api/profile/?email={}", urlencoding::encode(&email)))
            .await
    }

    /// Fetch the full plant catalogue, newest first
    pub async fn fetch_plants(&self) -> Result<Vec<Plant>, ApiError> {
        let plants: Vec<Plant> = self.get_json("/api/get_plants/").await?;
        debug!(count = plants.len(), "Fetched plants");
        Ok(plants)
    }

    pub async fn delete_plant(&self, plant_id: &str) -> Result<(), ApiError> {
        check_id("plant", plant_id)?;
        self.delete(&format!("/api/delete_plant/{}/", plant_id)).await?;
        Ok(())
    }

    /// Fetch every registered user (admin)
    pub async fn fetch_users(&self) -> Result<Vec<UserAccount>, ApiError> {
        let users: Vec<UserAccount> = self.get_json("/api/get_users/").await?;
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        check_id("user", user_id)?;
        self.delete(&format!("/api/delete_user/{}/", user_id)).await?;
        Ok(())
    }

    /// Fetch feedback submitted from the mobile app (admin)
    pub async fn fetch_feedbacks(&self) -> Result<Vec<Feedback>, ApiError> {
        self.get_json("/api/get_feedbacks/").await
    }

    /// Fetch every terms and conditions version, newest first
    pub async fn fetch_terms(&self) -> Result<Vec<TermsVersion>, ApiError> {
        self.get_json("/api/get_terms_conditions/").await
    }

    /// Update the signed-in admin. On success the session principal is
    /// replaced with what the backend returned; the tokens stay as they are.
    pub async fn update_admin_profile(
        &self,
        update: &AdminProfileUpdate,
    ) -> Result<Option<AdminProfile>, ApiError> {
        let body = serde_json::to_value(update)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode profile update: {}", e)))?;
        let response = self
            .request(Method::PUT, "/api/update_admin_profile/", Some(&body))
            .await?
            .error_for_status()?;
        self.apply_admin_update(&response)
    }
}

/// Ids are spliced into the path, so they must stay one segment.
fn check_id(kind: &str, id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.contains('/') || id.contains('?') {
        return Err(ApiError::InvalidRequest(format!("Invalid {} id: {:?}", kind, id)));
    }
    Ok(())
}
