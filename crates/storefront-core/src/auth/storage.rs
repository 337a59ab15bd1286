//! Persistent key/value storage for session state.
//!
//! A `SessionStorage` holds the three session entries under fixed keys. Every
//! write replaces the stored map in one step, so readers never observe half
//! of a login or logout. Backends that are shared between processes
//! (the session file, the OS keychain) read through on every `get` so a
//! change made elsewhere is visible immediately.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use super::credentials::KeyringStorage;

/// Storage key for the access token
pub const TOKEN_KEY: &str = "token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key for the JSON-serialized user profile
pub const USER_DATA_KEY: &str = "user";

/// Every key owned by the session, in clearing order
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY];

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage contents are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Apply `set` then `remove` as one replace of the stored map
    fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError>;

    /// Short human-readable location, used in status output
    fn describe(&self) -> String;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        self.update(entries, &[])
    }

    /// Absent keys are ignored
    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.update(&[], keys)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(&[(key, value)], &[])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(&[], &[key])
    }
}

/// Which backend holds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" | "keychain" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(StorageError::Unavailable(format!(
                "unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Open the configured backend
pub fn open_storage(
    kind: StorageKind,
    cache_dir: &Path,
) -> Result<Arc<dyn SessionStorage>, StorageError> {
    let storage: Arc<dyn SessionStorage> = match kind {
        StorageKind::File => Arc::new(FileStorage::new(cache_dir.join(SESSION_FILE))),
        StorageKind::Keyring => Arc::new(KeyringStorage::new()),
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    };
    debug!(backend = %storage.describe(), "Session storage opened");
    Ok(storage)
}

pub(crate) type EntryMap = BTreeMap<String, String>;

pub(crate) fn apply_update(map: &mut EntryMap, set: &[(&str, &str)], remove: &[&str]) {
    for (key, value) in set {
        map.insert((*key).to_string(), (*value).to_string());
    }
    for key in remove {
        map.remove(*key);
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Process-local storage. Cloning the `Arc` shares it the way two browser
/// tabs share `localStorage`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<EntryMap>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EntryMap>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        apply_update(&mut entries, set, remove);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ============================================================================
// File storage
// ============================================================================

/// JSON object on disk, shared by every process pointed at the same path.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<EntryMap, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(EntryMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EntryMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a uniquely named sibling temp file and rename it over the
    /// target, so readers see either the old map or the new one.
    fn write_map(&self, map: &EntryMap) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let contents = serde_json::to_string_pretty(map)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn replace_map(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("session file lock poisoned".to_string()))?;
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(StorageError::Serialization(e)) => {
                warn!(error = %e, path = %self.path.display(), "Replacing unreadable session file");
                EntryMap::new()
            }
            Err(e) => return Err(e),
        };
        apply_update(&mut map, set, remove);
        self.write_map(&map)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map()?.remove(key))
    }

    fn update(&self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StorageError> {
        self.replace_map(set, remove)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);

        storage
            .set_many(&[(TOKEN_KEY, "a"), (REFRESH_TOKEN_KEY, "b")])
            .unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("b"));

        storage.set(TOKEN_KEY, "c").unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("c"));

        storage
            .update(&[(USER_DATA_KEY, "{}")], &[REFRESH_TOKEN_KEY])
            .unwrap();
        assert_eq!(storage.get(USER_DATA_KEY).unwrap().as_deref(), Some("{}"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);

        storage.remove_many(&SESSION_KEYS).unwrap();
        for key in SESSION_KEYS {
            assert_eq!(storage.get(key).unwrap(), None);
        }
    }

    #[test]
    fn test_file_storage_is_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SESSION_FILE);
        let first = FileStorage::new(path.clone());
        let second = FileStorage::new(path);

        assert_eq!(first.get(TOKEN_KEY).unwrap(), None);
        first.set_many(&[(TOKEN_KEY, "t1"), (USER_DATA_KEY, "{}")]).unwrap();
        assert_eq!(second.get(TOKEN_KEY).unwrap().as_deref(), Some("t1"));

        second.remove(TOKEN_KEY).unwrap();
        assert_eq!(first.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(first.get(USER_DATA_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_storage_concurrent_writers_on_one_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);

        let writers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let storage = FileStorage::new(path.clone());
                std::thread::spawn(move || {
                    (0..200)
                        .filter(|i| storage.set(TOKEN_KEY, &format!("{}-{}", name, i)).is_err())
                        .count()
                })
            })
            .collect();
        let errors: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(errors, 0);

        let last = FileStorage::new(path).get(TOKEN_KEY).unwrap().unwrap();
        assert!(last == "a-199" || last == "b-199", "unexpected final value {}", last);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files must not be left behind");
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(path);
        assert!(matches!(
            storage.get(TOKEN_KEY),
            Err(StorageError::Serialization(_))
        ));

        // Clearing still works and leaves a valid file behind
        storage.remove_many(&SESSION_KEYS).unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_storage_kind_from_str() {
        assert_eq!("file".parse::<StorageKind>().unwrap(), StorageKind::File);
        assert_eq!(" Keychain ".parse::<StorageKind>().unwrap(), StorageKind::Keyring);
        assert_eq!("MEMORY".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("redis".parse::<StorageKind>().is_err());
    }
}
