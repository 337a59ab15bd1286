//! Shared helpers for integration tests: token minting and a session wired
//! to a mock backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use storefront_core::api::ApiClient;
use storefront_core::auth::{MemoryStorage, SessionOptions, SessionStorage, SessionStore};
use storefront_core::models::{LoginResponse, UserProfile};
use storefront_core::navigation::HistoryNavigator;
use wiremock::MockServer;

pub const LOGIN_PATH: &str = "/pages/login.html";
pub const HOME_PATH: &str = "/";

/// A JWT-shaped token whose `exp` is `secs_from_now` away. `label` keeps
/// tokens minted in the same second distinct.
pub fn mint_token(label: &str, secs_from_now: i64) -> String {
    let exp = Utc::now().timestamp() + secs_from_now;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "1", "jti": label, "exp": exp }).to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn valid_token(label: &str) -> String {
    mint_token(label, 3600)
}

pub fn expired_token(label: &str) -> String {
    mint_token(label, -3600)
}

pub fn profile(is_admin: bool) -> UserProfile {
    serde_json::from_value(json!({
        "id": 42,
        "email": "jane@example.com",
        "firstname": "Jane",
        "lastname": "Doe",
        "is_active": true,
        "is_admin": is_admin,
        "is_verified": true
    }))
    .expect("valid profile json")
}

pub fn login_response(token: &str, refresh_token: Option<&str>) -> LoginResponse {
    LoginResponse {
        token: token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        user: profile(false),
    }
}

pub fn options() -> SessionOptions {
    SessionOptions {
        refresh_interval: Duration::from_secs(3600),
        watch_interval: None,
        login_path: LOGIN_PATH.to_string(),
        home_path: HOME_PATH.to_string(),
    }
}

pub struct Harness {
    pub server: MockServer,
    pub storage: Arc<MemoryStorage>,
    pub navigator: Arc<HistoryNavigator>,
    pub session: Arc<SessionStore>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(options()).await
    }

    pub async fn start_with(options: SessionOptions) -> Self {
        let server = MockServer::start().await;
        let storage = Arc::new(MemoryStorage::new());
        let navigator = Arc::new(HistoryNavigator::new());
        let session = session_for(&server.uri(), storage.clone(), navigator.clone(), options);
        Self {
            server,
            storage,
            navigator,
            session,
        }
    }

    /// Requests the mock backend received for `path`
    pub async fn requests_to(&self, path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == path)
            .collect()
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.storage.get(key).expect("memory storage read")
    }
}

pub fn session_for(
    base_url: &str,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<HistoryNavigator>,
    options: SessionOptions,
) -> Arc<SessionStore> {
    let api = ApiClient::new(base_url).expect("client builds");
    SessionStore::new(api, storage, navigator, options)
}

pub fn authorization(request: &wiremock::Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
