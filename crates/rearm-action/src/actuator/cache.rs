//! Process-local cache of per-user actuator connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Actuator;

/// Live actuator connections keyed by user id.
///
/// Entries are never persisted. They go away on [`clear`](Self::clear) or
/// when the process exits.
#[derive(Default)]
pub struct ConnectionCache {
    entries: Mutex<HashMap<String, Arc<dyn Actuator>>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Actuator>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<dyn Actuator>> {
        self.lock().get(user_id).cloned()
    }

    pub fn set(&self, user_id: &str, actuator: Arc<dyn Actuator>) {
        self.lock().insert(user_id.to_string(), actuator);
    }

    /// Drop the user's connection. Returns whether one was cached.
    pub fn clear(&self, user_id: &str) -> bool {
        self.lock().remove(user_id).is_some()
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("entries", &self.len())
            .finish()
    }
}
