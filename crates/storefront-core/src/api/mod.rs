//! REST API client module for the storefront backend.
//!
//! This module provides the `ApiClient` every caller uses to reach the
//! backend, the middleware chain it runs requests through, and `AuthApi`
//! for the auth endpoints that must not be intercepted.

pub mod auth;
pub mod client;
pub mod error;
pub mod middleware;

pub use auth::AuthApi;
pub use client::ApiClient;
pub use error::ApiError;
pub use middleware::{Middleware, MiddlewareChain, Next};
