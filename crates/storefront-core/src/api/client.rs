//! API client for communicating with the storefront REST backend.
//!
//! `ApiClient` is the one way application code reaches the network. Each
//! request runs through the client's [`MiddlewareChain`], which is where the
//! session installs credential attachment and 401 recovery.

use std::time::Duration;

use reqwest::{header, Client, Method, Request, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::middleware::{MiddlewareChain, Next};
use super::{ApiError, AuthApi};
use crate::config::Config;

/// Default HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API client for the storefront backend.
/// Clone is cheap - reqwest::Client and the middleware chain are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    chain: MiddlewareChain,
}

impl ApiClient {
    /// Create a client rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain: MiddlewareChain::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Raw auth endpoints that bypass the middleware chain, sharing the pool
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.client.clone(), &self.base_url)
    }

    /// Resolve a path against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Start building a request. It only reaches the network through
    /// [`send`](Self::send), which applies the middleware chain.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json")
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.execute(request).await
    }

    /// Run a prepared request through every installed stage
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        let stages = self.chain.snapshot();
        let response = Next::new(&self.client, &stages).run(request).await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::parse_json(response, &url).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Self::parse_json(response, &url).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .send(self.request(Method::PUT, path).json(body))
            .await?;
        Self::parse_json(response, &url).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.send(self.request(Method::DELETE, path)).await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://shop.local:5000/").unwrap();
        assert_eq!(client.base_url(), "http://shop.local:5000");
        assert_eq!(client.url("/api/products"), "http://shop.local:5000/api/products");
        assert_eq!(client.url("api/brands"), "http://shop.local:5000/api/brands");
        assert_eq!(
            client.url("https://cdn.example.com/img.png"),
            "https://cdn.example.com/img.png"
        );
    }

    #[test]
    fn test_new_client_has_no_middleware() {
        let client = ApiClient::new("http://localhost").unwrap();
        assert!(client.middleware().is_empty());
        // Clones share the chain
        let clone = client.clone();
        assert!(clone.middleware().names().is_empty());
    }
}
