//! Direct calls to the `/api/auth` endpoints.
//!
//! These bypass the middleware chain: the refresh call carries the refresh
//! token rather than the access token, and a 401 from any of them must not
//! trigger another refresh.

use reqwest::{header, Client, Response};
use tracing::{debug, warn};

use super::{ApiClient, ApiError};
use crate::auth::AccessToken;
use crate::models::{Credentials, LoginResponse, RefreshResponse, Registration};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const PROFILE_PATH: &str = "/api/auth/me";

#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub(crate) fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = ApiClient::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Exchange email and password for a session
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        debug!(email = %credentials.email, "Requesting login");
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .header(header::ACCEPT, "application/json")
            .json(credentials)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Create an account; the backend answers with a ready session
    pub async fn register(&self, registration: &Registration) -> Result<LoginResponse, ApiError> {
        debug!(email = %registration.email, "Requesting registration");
        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .header(header::ACCEPT, "application/json")
            .json(registration)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Mint a new access token using the refresh token as bearer
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .header(header::ACCEPT, "application/json")
            .bearer_auth(refresh_token)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Ask the backend to invalidate the access token.
    /// Any HTTP status is accepted; only transport failures are errors.
    pub async fn logout(&self, token: &AccessToken) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .bearer_auth(token.as_str())
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Logout endpoint returned an error status");
        }
        Ok(())
    }
}
