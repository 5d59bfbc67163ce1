//! REST API client module for the PlantPal backend.
//!
//! This module provides the `ApiClient` for logging in and for making
//! authenticated calls against the plant database, profiles and terms.
//!
//! Authenticated calls carry a JWT bearer token. An expired token is
//! refreshed once through `/api/refresh_token/` and the call retried once.

pub mod client;
pub mod error;
mod resources;

pub use client::{ApiClient, ApiResponse};
pub use error::ApiError;
pub use reqwest::Method;
