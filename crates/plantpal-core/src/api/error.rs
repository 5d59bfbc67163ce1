use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never got a response: DNS, refused connection, timeout.
    #[error("Network error: {0}")]
    Connectivity(#[source] reqwest::Error),

    /// A 401 could not be resolved by refreshing. The session is cleared.
    #[error("Session expired - please log in again")]
    SessionExpired,

    /// 401 that is not about an expired session, e.g. wrong password.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used throughout the backend.
#[derive(Deserialize)]
struct BackendError {
    error: String,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Human-readable message from an error body: the backend's `error`
    /// field when present, otherwise the (truncated) raw body.
    fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<BackendError>(body) {
            Ok(parsed) => parsed.error,
            Err(_) => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            400..=499 => ApiError::Validation {
                status: status.as_u16(),
                message,
            },
            500..=599 => ApiError::ServerError {
                status: status.as_u16(),
                message,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// True when the caller should route the user back to login.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// True when the caller should suggest checking the connection.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Connectivity(_))
    }
}
