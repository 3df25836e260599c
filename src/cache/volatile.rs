//! Process-lifetime result map

use crate::cache::CacheKey;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// In-memory key to value map behind a reader/writer lock.
///
/// The lock is held only for the map access itself.
pub struct VolatileCache<T> {
    entries: RwLock<HashMap<CacheKey, T>>,
}

impl<T: Clone> VolatileCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn set(&self, key: &CacheKey, value: T) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), value);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for VolatileCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
