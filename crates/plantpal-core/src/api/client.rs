//! API client for the PlantPal backend.
//!
//! Every authenticated call goes through [`ApiClient::request`], which
//! attaches the bearer token, refreshes once on a 401 and retries once.

use anyhow::Result;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::auth::{
    AdminProfile, Principal, SessionContext, SessionData, TokenPair, TokenRefresher, UserProfile,
};
use crate::config::{Config, Platform};

const SIGNUP_PATH: &str = "/api/signup/";
const ADMIN_SIGNUP_PATH: &str = "/api/admin-signup/";

/// Body of a response, read in full.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Connectivity)?;
        Ok(Self { status, body })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    /// Turn a non-success status into the matching [`ApiError`].
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: Option<UserProfile>,
    admin: Option<AdminProfile>,
    access: Option<String>,
    refresh: Option<String>,
    /// The user login endpoint nests the pair here instead.
    tokens: Option<TokenPair>,
}

impl LoginResponse {
    fn into_session(self, platform: Platform) -> Option<SessionData> {
        let principal = match platform {
            Platform::Mobile => Principal::User(self.user?),
            Platform::Web => Principal::Admin(self.admin?),
        };
        let tokens = match (self.access, self.refresh) {
            (Some(access), Some(refresh)) => TokenPair::new(access, refresh),
            _ => self.tokens?,
        };
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            return None;
        }
        Some(SessionData::new(principal, tokens))
    }
}

#[derive(Debug, Deserialize)]
struct SignupResponse {
    user: Option<UserProfile>,
    admin: Option<AdminProfile>,
}

#[derive(Debug, Deserialize)]
struct AdminUpdateResponse {
    admin: Option<AdminProfile>,
}

/// Backend client bound to one session.
/// Clone is cheap - the HTTP client and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Config,
    session: SessionContext,
    refresher: TokenRefresher,
}

impl ApiClient {
    pub fn new(config: &Config, session: SessionContext) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        let refresher = TokenRefresher::new(http.clone(), config, session.clone());

        Ok(Self {
            http,
            config: config.clone(),
            session,
            refresher,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    // ===== Authentication =====

    /// Log in and store the returned principal and tokens as the session.
    ///
    /// Wrong credentials come back as [`ApiError::Unauthorized`] or
    /// [`ApiError::Validation`], never as `SessionExpired`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, ApiError> {
        let email = normalize_email(email);
        let platform = self.config.platform;
        info!(email = %email, platform = platform.as_str(), "Logging in");

        let body = serde_json::json!({ "email": email, "password": password });
        let response = self.post_unauthenticated(platform.login_path(), &body).await?;
        let login: LoginResponse = response.json()?;
        let data = login.into_session(platform).ok_or_else(|| {
            ApiError::InvalidResponse("Login response is missing the principal or tokens".to_string())
        })?;

        let principal = data.principal.clone();
        if self.session.set_session(Some(data)).is_err() {
            // Logged in for this run; the failure is already logged.
            warn!("Login will not survive a restart");
        }
        Ok(principal)
    }

    /// Create an end-user account. Does not log in.
    pub async fn signup(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let email = normalize_email(email);
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self.post_unauthenticated(SIGNUP_PATH, &body).await?;
        response
            .json::<SignupResponse>()?
            .user
            .ok_or_else(|| ApiError::InvalidResponse("Signup response has no user".to_string()))
    }

    /// Create an admin account. Does not log in.
    pub async fn admin_signup(
        &self,
        email: &str,
        password: &str,
        user_name: &str,
    ) -> Result<AdminProfile, ApiError> {
        let email = normalize_email(email);
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "user_name": user_name.trim(),
        });
        let response = self.post_unauthenticated(ADMIN_SIGNUP_PATH, &body).await?;
        response
            .json::<SignupResponse>()?
            .admin
            .ok_or_else(|| ApiError::InvalidResponse("Signup response has no admin".to_string()))
    }

    /// Forget the session locally. The backend keeps no session state.
    pub fn logout(&self) -> Result<(), ApiError> {
        info!("Logging out");
        self.session.clear_session().map_err(ApiError::Storage)
    }

    async fn post_unauthenticated(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        let url = self.config.endpoint(path);
        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(ApiError::Connectivity)?;
        ApiResponse::read(response).await?.error_for_status()
    }

    // ===== Authenticated requests =====

    /// Send an authenticated request.
    ///
    /// A 401 triggers one token refresh and one retry; whatever the retry
    /// returns is handed back. If the refresh fails the session is cleared
    /// and [`ApiError::SessionExpired`] returned. Any other status is
    /// returned as is, without retrying.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.session.wait_until_loaded().await;
        let Some(token) = self.session.access_token() else {
            debug!(path = path, "No session for authenticated request");
            return Err(ApiError::SessionExpired);
        };

        let url = self.config.endpoint(path);
        let first = self.send(&method, &url, body, &token).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        debug!(url = %url, "Access token rejected");
        let retry_token = match self.session.access_token() {
            // Another request refreshed while this one was in flight.
            Some(current) if current != token => current,
            _ => self
                .refresher
                .refresh_access_token()
                .await
                .ok_or(ApiError::SessionExpired)?,
        };

        debug!(url = %url, "Retrying with refreshed token");
        self.send(&method, &url, body, &retry_token).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = url, error = %e, "Request failed");
            ApiError::Connectivity(e)
        })?;
        ApiResponse::read(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None)
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = to_body(body)?;
        self.request(Method::POST, path, Some(&body))
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = to_body(body)?;
        self.request(Method::PUT, path, Some(&body))
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, None)
            .await?
            .error_for_status()
    }

    /// Replace the admin principal after a successful profile update.
    pub(crate) fn apply_admin_update(&self, body: &ApiResponse) -> Result<Option<AdminProfile>, ApiError> {
        let Some(admin) = body.json::<AdminUpdateResponse>()?.admin else {
            return Ok(None);
        };
        if self
            .session
            .replace_principal(Principal::Admin(admin.clone()))
            .is_err()
        {
            warn!("Updated admin profile will not survive a restart");
        }
        Ok(Some(admin))
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode request body: {}", e)))
}

/// The backend matches accounts on the trimmed, lower-cased address.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
