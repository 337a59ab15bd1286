//! Observer for storage changes made by other processes.
//!
//! The watcher polls the given keys and publishes a [`StorageEvent`] each
//! time a value differs from the last one it saw. Delivery is at least once
//! per observed change; changes that revert between two polls are missed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::storage::SessionStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StorageEvent {
    pub fn is_removal(&self) -> bool {
        self.old_value.is_some() && self.new_value.is_none()
    }
}

/// Handle to a running watcher; the poll task stops when this is dropped.
pub struct StorageWatcher {
    handle: JoinHandle<()>,
}

impl StorageWatcher {
    /// Start polling `keys` every `interval`. Must be called inside a Tokio runtime.
    pub fn spawn(
        storage: Arc<dyn SessionStorage>,
        keys: Vec<String>,
        interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StorageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut last: Vec<Option<String>> = keys
                .iter()
                .map(|key| storage.get(key).ok().flatten())
                .collect();

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                for (key, previous) in keys.iter().zip(last.iter_mut()) {
                    let current = match storage.get(key) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(key = %key, error = %e, "Storage poll failed");
                            continue;
                        }
                    };
                    if current == *previous {
                        continue;
                    }
                    debug!(key = %key, present = current.is_some(), "External storage change");
                    let event = StorageEvent {
                        key: key.clone(),
                        old_value: previous.take(),
                        new_value: current.clone(),
                    };
                    *previous = current;
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
        });

        (Self { handle }, rx)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for StorageWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
