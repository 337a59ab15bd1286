//! The session store: single source of truth for whether the user is
//! signed in, and the owner of everything that keeps a session alive.
//!
//! One `SessionStore` is constructed per process and shared as
//! `Arc<SessionStore>`. While a session is active it owns:
//! - the proactive refresh task (one per active session, aborted on logout)
//! - the request interception stages on its [`ApiClient`]
//! - the storage watcher that notices a logout performed by another process
//!
//! Construction and [`login`](SessionStore::login) spawn Tokio tasks and
//! must run inside a Tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::events::{SessionEvent, SessionState, EVENT_CHANNEL_CAPACITY};
use super::interceptor;
use super::storage::{
    open_storage, SessionStorage, StorageError, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY,
    USER_DATA_KEY,
};
use super::token::AccessToken;
use super::watcher::{StorageEvent, StorageWatcher};
use crate::api::auth::PROFILE_PATH;
use crate::api::ApiClient;
use crate::config::Config;
use crate::models::{Credentials, LoginResponse, Registration, UserProfile};
use crate::navigation::Navigator;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Period of the proactive refresh task
    pub refresh_interval: Duration,
    /// Poll period for external storage changes; `None` disables watching
    pub watch_interval: Option<Duration>,
    /// Where to send the user when the session ends
    pub login_path: String,
    /// Where to send a signed-in user who lacks access
    pub home_path: String,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            watch_interval: config.watch_interval(),
            login_path: config.login_path.clone(),
            home_path: config.home_path.clone(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a refresh attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token is stored
    Refreshed,
    /// The session was replaced or ended while the call was in flight, so
    /// the new token was discarded
    Superseded,
    Failed,
}

type WatchTasks = (StorageWatcher, JoinHandle<()>);

pub struct SessionStore {
    api: ApiClient,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<dyn Navigator>,
    options: SessionOptions,
    events: broadcast::Sender<SessionEvent>,
    /// True while this instance runs a session lifecycle
    active: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    watch_tasks: Mutex<Option<WatchTasks>>,
    self_ref: Weak<SessionStore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionStore {
    /// Build the store and pick up any valid session already in storage.
    pub fn new(
        api: ApiClient,
        storage: Arc<dyn SessionStorage>,
        navigator: Arc<dyn Navigator>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Arc::new_cyclic(|self_ref| Self {
            api,
            storage,
            navigator,
            options,
            events,
            active: AtomicBool::new(false),
            refresh_task: Mutex::new(None),
            watch_tasks: Mutex::new(None),
            self_ref: self_ref.clone(),
        });
        store.initialize();
        store
    }

    /// Build the API client and storage described by `config`
    pub fn from_config(config: &Config, navigator: Arc<dyn Navigator>) -> Result<Arc<Self>> {
        let api = ApiClient::from_config(config).context("Failed to build HTTP client")?;
        let storage = open_storage(config.storage, &config.cache_dir()?)
            .context("Failed to open session storage")?;
        Ok(Self::new(
            api,
            storage,
            navigator,
            SessionOptions::from_config(config),
        ))
    }

    fn initialize(&self) {
        if let Some(interval) = self.options.watch_interval {
            self.start_watching(interval);
        }
        if self.is_authenticated() {
            info!("Existing session detected");
            self.activate();
        } else {
            debug!("No valid session in storage");
        }
    }

    // ===== Accessors =====

    /// Client for every application request. Clones share the middleware chain.
    pub fn api(&self) -> ApiClient {
        self.api.clone()
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The stored access token, expired or not
    pub fn token(&self) -> Option<AccessToken> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.map(AccessToken::from),
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                None
            }
        }
    }

    /// The stored access token, only if it has not expired
    pub fn authenticated_token(&self) -> Option<AccessToken> {
        self.token().filter(|token| !token.is_expired())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_token().is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    /// Cached profile. Advisory only: presence does not imply authentication.
    pub fn user_profile(&self) -> Option<UserProfile> {
        let raw = match self.storage.get(USER_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read user profile");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Cached user profile is not valid JSON");
                None
            }
        }
    }

    fn stored_refresh_token(&self) -> Option<String> {
        match self.storage.get(REFRESH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                None
            }
        }
    }

    /// Whether the proactive refresh task is currently scheduled
    pub fn is_refresh_scheduled(&self) -> bool {
        lock(&self.refresh_task)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    // ===== Lifecycle =====

    /// Store a session returned by the backend and start maintaining it.
    pub fn login(&self, response: LoginResponse) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(&response.user)?;

        let mut set = vec![
            (TOKEN_KEY, response.token.as_str()),
            (USER_DATA_KEY, user_json.as_str()),
        ];
        let mut remove = Vec::new();
        match response.refresh_token.as_deref() {
            Some(refresh) => set.push((REFRESH_TOKEN_KEY, refresh)),
            None => remove.push(REFRESH_TOKEN_KEY),
        }
        self.storage.update(&set, &remove)?;

        info!(email = ?response.user.email, "Login successful");
        self.activate();
        self.emit(SessionEvent::Login(response.user));
        Ok(())
    }

    /// Validate credentials, call the login endpoint and store the session
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<UserProfile> {
        credentials.validate()?;
        let response = self
            .api
            .auth()
            .login(credentials)
            .await
            .context("Login failed")?;
        let user = response.user.clone();
        self.login(response).context("Failed to store session")?;
        Ok(user)
    }

    /// Validate a registration, create the account and store the session
    pub async fn sign_up(&self, registration: &Registration) -> Result<UserProfile> {
        registration.validate()?;
        let response = self
            .api
            .auth()
            .register(registration)
            .await
            .context("Registration failed")?;
        let user = response.user.clone();
        self.login(response).context("Failed to store session")?;
        Ok(user)
    }

    /// End the session. The server call is best effort; local state is
    /// always cleared and the user is sent to the login location.
    pub async fn logout(&self) {
        if let Some(token) = self.token() {
            if let Err(e) = self.api.auth().logout(&token).await {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }
        self.end_session();
    }

    /// Mint a new access token. Returns false (leaving stored tokens as they
    /// were) on any failure; deciding whether to log out is up to the caller.
    /// A result discarded because a newer session took over counts as
    /// success when that session is still authenticated.
    pub async fn refresh_token(&self) -> bool {
        match self.refresh_access_token().await {
            RefreshOutcome::Refreshed => true,
            RefreshOutcome::Superseded => self.is_authenticated(),
            RefreshOutcome::Failed => false,
        }
    }

    /// Like [`refresh_token`](Self::refresh_token), but tells a failed
    /// refresh apart from one overtaken by a login or logout.
    pub async fn refresh_access_token(&self) -> RefreshOutcome {
        let Some(refresh) = self.stored_refresh_token() else {
            debug!("No refresh token stored");
            return RefreshOutcome::Failed;
        };

        match self.api.auth().refresh(&refresh).await {
            Ok(response) if !response.token.is_empty() => {
                // A logout or re-login while the call was in flight wins
                if self.stored_refresh_token().as_deref() != Some(refresh.as_str()) {
                    debug!("Session changed during refresh, discarding new token");
                    return RefreshOutcome::Superseded;
                }
                if let Err(e) = self.storage.set(TOKEN_KEY, &response.token) {
                    warn!(error = %e, "Failed to store refreshed token");
                    return RefreshOutcome::Failed;
                }
                debug!("Access token refreshed");
                self.emit(SessionEvent::Refreshed);
                RefreshOutcome::Refreshed
            }
            Ok(_) => {
                warn!("Refresh response carried an empty token");
                RefreshOutcome::Failed
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    /// Fetch `/api/auth/me` through the intercepted client and cache it
    pub async fn reload_profile(&self) -> Result<UserProfile> {
        let profile: UserProfile = self
            .api
            .get_json(PROFILE_PATH)
            .await
            .context("Failed to fetch profile")?;
        let json = serde_json::to_string(&profile)?;
        self.storage
            .set(USER_DATA_KEY, &json)
            .context("Failed to store profile")?;
        self.emit(SessionEvent::ProfileUpdated(profile.clone()));
        Ok(profile)
    }

    /// React to a storage change made elsewhere. Removal of the access token
    /// ends this session without contacting the server again.
    pub fn handle_storage_event(&self, event: &StorageEvent) {
        if event.key != TOKEN_KEY || event.new_value.is_some() {
            return;
        }
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Access token cleared by another process, ending session");
            self.end_session();
        }
    }

    // ===== Internals =====

    fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
        if interceptor::install(&self.self_ref, self.api.middleware()) {
            debug!("Request interceptor installed");
        }
        self.start_refresh_task();
    }

    fn end_session(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.cancel_refresh_task();
        if let Err(e) = self.storage.remove_many(&SESSION_KEYS) {
            warn!(error = %e, "Failed to clear session storage");
        }
        self.emit(SessionEvent::Logout);
        self.navigator.navigate(&self.options.login_path);
        info!("Session ended");
    }

    fn start_refresh_task(&self) {
        let weak = self.self_ref.clone();
        let period = self.options.refresh_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let refreshed = store.refresh_token().await;
                debug!(refreshed, "Scheduled token refresh");
            }
        });

        if let Some(previous) = lock(&self.refresh_task).replace(handle) {
            previous.abort();
        }
    }

    fn cancel_refresh_task(&self) {
        if let Some(handle) = lock(&self.refresh_task).take() {
            handle.abort();
            debug!("Refresh task cancelled");
        }
    }

    fn start_watching(&self, interval: Duration) {
        let (watcher, mut rx) = StorageWatcher::spawn(
            self.storage.clone(),
            vec![TOKEN_KEY.to_string()],
            interval,
        );
        let weak = self.self_ref.clone();
        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(store) = weak.upgrade() else {
                    break;
                };
                store.handle_storage_event(&event);
            }
        });
        *lock(&self.watch_tasks) = Some((watcher, consumer));
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event subscribers");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.refresh_task).take() {
            handle.abort();
        }
        if let Some((watcher, consumer)) = lock(&self.watch_tasks).take() {
            watcher.stop();
            consumer.abort();
        }
    }
}
