//! Core library for the PlantPal mobile and web clients.
//!
//! Wires a persisted session, a shared session context and a single-flight
//! token refresher into an API client whose authenticated calls recover
//! from an expired access token exactly once.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse};
pub use auth::{Principal, SessionContext, SessionData, SessionStore, TokenPair};
pub use config::{Config, Platform, StorageBackend};
