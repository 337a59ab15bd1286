//! Storefront client core.
//!
//! Session management and the HTTP client for the storefront REST backend.
//! Construct one [`SessionStore`](auth::SessionStore), share it, and send
//! every request through the [`ApiClient`](api::ApiClient) it hands out so
//! credentials are attached and expired tokens are refreshed in one place.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionEvent, SessionState, SessionStore};
pub use config::Config;
pub use navigation::{HistoryNavigator, LogNavigator, Navigator};
