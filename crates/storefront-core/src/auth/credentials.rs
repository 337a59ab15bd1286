use std::sync::Mutex;

use keyring::Entry;

use super::storage::{apply_update, EntryMap, SessionStorage, StorageError};

const SERVICE_NAME: &str = "storefront";

/// Keychain account holding the serialized session map
const SESSION_ACCOUNT: &str = "session";

/// Session storage in the OS keychain.
///
/// All entries live in one keychain item so a login or logout is a single
/// credential write.
pub struct KeyringStorage {
    account: String,
    write_lock: Mutex<()>,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_account(SESSION_ACCOUNT)
    }

    pub fn with_account(account: &str) -> Self {
        Self {
            account: account.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Ok(Entry::new(SERVICE_NAME, &self.account)?)
    }

    fn read_map(&self) -> Result<EntryMap, StorageError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(serde_json::from_str(&secret)?),
            Err(keyring::Error::NoEntry) => Ok(EntryMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &EntryMap) -> Result<(), StorageError> {
        let entry = self.entry()?;
        if map.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }
        entry.set_password(&serde_json::to_string(map)?)?;
        Ok(())
    }

    fn replace_map(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("keychain lock poisoned".to_string()))?;
        let mut map = self.read_map()?;
        apply_update(&mut map, set, remove);
        self.write_map(&map)
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map()?.remove(key))
    }

    fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError> {
        self.replace_map(set, remove)
    }

    fn describe(&self) -> String {
        format!("keychain {}/{}", SERVICE_NAME, self.account)
    }
}
