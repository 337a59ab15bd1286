//! Middleware stages the session installs on the API client.
//!
//! Installed in this order, so the refresh stage wraps the bearer stage and
//! a replayed request picks up whatever token is current at resend time:
//!
//! 1. [`RefreshOnUnauthorized`] - on a 401, refresh once and resend once,
//!    or end the session if the refresh fails. A refresh overtaken by a new
//!    login resends with that session's token; one overtaken by a logout
//!    returns the 401 as is.
//! 2. [`BearerAuth`] - attach `Authorization: Bearer <token>` while the
//!    session is authenticated.
//!
//! Both hold a weak reference; once the store is dropped they pass requests
//! through untouched.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, StatusCode};
use tracing::{debug, info, warn};

use super::{RefreshOutcome, SessionStore};
use crate::api::{ApiError, Middleware, MiddlewareChain, Next};

pub const BEARER_STAGE: &str = "session-bearer";
pub const REFRESH_STAGE: &str = "session-refresh-on-401";

pub struct BearerAuth {
    session: Weak<SessionStore>,
}

impl BearerAuth {
    pub fn new(session: Weak<SessionStore>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    fn name(&self) -> &'static str {
        BEARER_STAGE
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        if let Some(token) = self
            .session
            .upgrade()
            .and_then(|store| store.authenticated_token())
        {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        next.run(request).await
    }
}

pub struct RefreshOnUnauthorized {
    session: Weak<SessionStore>,
}

impl RefreshOnUnauthorized {
    pub fn new(session: Weak<SessionStore>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    fn name(&self) -> &'static str {
        REFRESH_STAGE
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        // Streaming bodies cannot be cloned and therefore cannot be replayed
        let replay = request.try_clone();
        let url = request.url().clone();

        let response = next.run(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(store) = self.session.upgrade() else {
            return Ok(response);
        };

        debug!(url = %url, "Received 401, attempting token refresh");
        match store.refresh_access_token().await {
            RefreshOutcome::Refreshed => {}
            RefreshOutcome::Superseded if store.is_authenticated() => {
                debug!(url = %url, "Session replaced during refresh, using the current token");
            }
            RefreshOutcome::Superseded => {
                debug!(url = %url, "Session ended during refresh");
                return Ok(response);
            }
            RefreshOutcome::Failed => {
                warn!(url = %url, "Token refresh failed after 401, ending session");
                store.logout().await;
                return Ok(response);
            }
        }

        match replay {
            Some(retry) => {
                info!(url = %url, "Resending request");
                next.run(retry).await
            }
            None => {
                warn!(url = %url, "Token refreshed but request body cannot be replayed");
                Ok(response)
            }
        }
    }
}

/// Install both stages on `chain`. Already-installed stages are left alone.
/// Returns true if anything was added.
pub fn install(session: &Weak<SessionStore>, chain: &MiddlewareChain) -> bool {
    let refresh = chain.install(Arc::new(RefreshOnUnauthorized::new(session.clone())));
    let bearer = chain.install(Arc::new(BearerAuth::new(session.clone())));
    refresh || bearer
}
