//! Data models for the storefront auth API.
//!
//! These types mirror the JSON payloads exchanged with the backend's
//! `/api/auth` endpoints and the profile cached alongside the session.

pub mod auth;
pub mod user;

pub use auth::{Credentials, LoginResponse, RefreshResponse, Registration};
pub use user::UserProfile;
