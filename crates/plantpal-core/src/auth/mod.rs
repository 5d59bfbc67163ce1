//! Session management for PlantPal clients.
//!
//! This module provides:
//! - `SessionStore`: durable storage of the principal and token pair
//!   (file, OS keychain, or memory)
//! - `SessionContext`: the shared in-memory session, restored once at start
//! - `TokenRefresher`: single-flight exchange of the refresh token for a new
//!   access token
//!
//! A principal is never held without both tokens, in memory or on disk.

pub mod context;
pub mod principal;
pub mod refresh;
pub mod store;

pub use context::SessionContext;
pub use principal::{AdminProfile, Principal, SessionData, TokenPair, UserProfile};
pub use refresh::TokenRefresher;
pub use store::{
    store_for, FileSessionStore, KeyringSessionStore, MemorySessionStore, PersistedRecord,
    SessionStore,
};
