//! Where the session sends the user when it ends or access is refused.

use std::sync::Mutex;

use tracing::info;

pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

/// Logs navigation requests. Used when nothing is driving a UI.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, location: &str) {
        info!(location = location, "Navigation requested");
    }
}

/// Remembers every location it was sent to.
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    visits: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        match self.visits.lock() {
            Ok(visits) => visits.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<String> {
        self.history().pop()
    }

    pub fn count(&self) -> usize {
        self.history().len()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, location: &str) {
        match self.visits.lock() {
            Ok(mut visits) => visits.push(location.to_string()),
            Err(poisoned) => poisoned.into_inner().push(location.to_string()),
        }
    }
}
