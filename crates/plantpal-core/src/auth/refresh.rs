use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::context::SessionContext;
use crate::config::Config;

pub const REFRESH_PATH: &str = "/api/refresh_token/";

/// A running exchange and the refresh token it was started for.
#[derive(Clone)]
struct InFlight {
    refresh: String,
    result: Shared<BoxFuture<'static, Option<String>>>,
}

/// Why an exchange produced no token. Never leaves this module; callers
/// only see `None`.
#[derive(Error, Debug)]
enum RefreshFailure {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Refresh rejected with status {0}")]
    Rejected(StatusCode),

    #[error("Refresh response carried no access token")]
    MalformedResponse,

    #[error("Session changed while refreshing")]
    SessionReplaced,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

/// Exchanges the refresh token for a new access token.
///
/// At most one exchange runs per refresh token: callers arriving while one
/// is in flight for the live session await the same result instead of
/// starting their own.
#[derive(Clone)]
pub struct TokenRefresher {
    http: Client,
    endpoint: String,
    session: SessionContext,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl TokenRefresher {
    pub fn new(http: Client, config: &Config, session: SessionContext) -> Self {
        Self {
            http,
            endpoint: config.endpoint(REFRESH_PATH),
            session,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// New access token, or `None` with the session cleared.
    ///
    /// Only the access token changes; the refresh token is kept. If the
    /// session is replaced (logout or another login) while the exchange is
    /// in flight, the result is discarded and the new session left alone.
    /// An exchange started for an earlier session is never joined.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.session.wait_until_loaded().await;
        let Some(refresh) = self.session.refresh_token() else {
            warn!(error = %RefreshFailure::MissingRefreshToken, "Token refresh failed, clearing session");
            // Failure to clear storage is logged by the context.
            let _ = self.session.clear_session();
            return None;
        };

        let flight = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(flight) if flight.refresh == refresh => {
                    debug!("Joining in-flight token refresh");
                    flight.result.clone()
                }
                _ => {
                    let result = self.clone().run(refresh.clone()).boxed().shared();
                    *slot = Some(InFlight {
                        refresh,
                        result: result.clone(),
                    });
                    result
                }
            }
        };
        flight.await
    }

    async fn run(self, refresh: String) -> Option<String> {
        let result = self.exchange(&refresh).await;
        {
            // Later 401s must start a fresh exchange. A newer flight for
            // another session may already own the slot.
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|f| f.refresh == refresh) {
                slot.take();
            }
        }

        match result {
            Ok(access) => {
                info!("Access token refreshed");
                Some(access)
            }
            Err(RefreshFailure::SessionReplaced) => {
                debug!("Discarding refreshed token for a replaced session");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                // Only the session that owned this refresh token is cleared.
                // Failure to clear storage is logged by the context.
                if let Ok(false) = self.session.clear_if_refresh_token(&refresh) {
                    debug!("Session replaced during failed refresh, leaving it");
                }
                None
            }
        }
    }

    async fn exchange(&self, refresh: &str) -> Result<String, RefreshFailure> {
        debug!(endpoint = %self.endpoint, "Refreshing access token");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected(status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|_| RefreshFailure::MalformedResponse)?;
        let access = body
            .access
            .filter(|a| !a.is_empty())
            .ok_or(RefreshFailure::MalformedResponse)?;

        match self.session.replace_access_token(refresh, access.clone()) {
            Ok(true) => Ok(access),
            Ok(false) => Err(RefreshFailure::SessionReplaced),
            // Memory already holds the new token; only persisting failed.
            Err(_) => Ok(access),
        }
    }
}
