//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: login, logout, token refresh and the request interceptor
//! - `AccessToken`: JWT expiry detection that fails closed
//! - `SessionStorage`: persisted session entries (file, keychain, memory)
//! - `StorageWatcher`: notices a session cleared by another process
//! - `guard`: authentication and administrator checks

pub mod credentials;
pub mod events;
pub mod guard;
pub mod interceptor;
pub mod session;
pub mod storage;
pub mod token;
pub mod watcher;

pub use credentials::KeyringStorage;
pub use events::{SessionEvent, SessionState};
pub use guard::{guard, GuardOptions, GuardOutcome};
pub use session::{RefreshOutcome, SessionOptions, SessionStore};
pub use storage::{
    open_storage, FileStorage, MemoryStorage, SessionStorage, StorageError, StorageKind,
    REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY, USER_DATA_KEY,
};
pub use token::AccessToken;
pub use watcher::{StorageEvent, StorageWatcher};
