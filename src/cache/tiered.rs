//! Volatile tier backed by an optional durable store
//!
//! Durable failures never fail a lookup or a store: reads degrade to a miss
//! and writes are logged, with the volatile tier still updated.

use crate::cache::{CacheKey, VolatileCache};
use crate::inspection::ToolKind;
use crate::store::DurableStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Two-tier result cache for one tool's results
pub struct TieredCache<T> {
    tool: ToolKind,
    volatile: VolatileCache<Arc<T>>,
    durable: Option<Arc<dyn DurableStore<T>>>,
}

impl<T> TieredCache<T> {
    pub fn new(tool: ToolKind, durable: Option<Arc<dyn DurableStore<T>>>) -> Self {
        Self {
            tool,
            volatile: VolatileCache::new(),
            durable,
        }
    }

    /// Volatile-tier lookup
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.volatile.get(key)
    }

    /// Volatile-tier insert
    pub fn set(&self, key: &CacheKey, value: Arc<T>) {
        self.volatile.set(key, value);
    }

    /// Durable-tier lookup, copying any hit into the volatile tier
    pub async fn load(&self, key: &CacheKey) -> Option<Arc<T>> {
        let durable = self.durable.as_ref()?;

        match durable.get(self.tool, key).await {
            Ok(Some(value)) => {
                debug!(
                    tool = %self.tool,
                    vm_name = key.vm_name(),
                    snapshot_name = key.snapshot_name(),
                    "Inspection data found in durable store"
                );
                let value = Arc::new(value);
                self.volatile.set(key, Arc::clone(&value));
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(tool = %self.tool, key = %key, error = %e, "Failed to read durable store");
                None
            }
        }
    }

    /// Insert into both tiers; the durable write is best effort
    pub async fn store(&self, key: &CacheKey, value: Arc<T>) {
        self.volatile.set(key, Arc::clone(&value));

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.set(self.tool, key, &value).await {
                warn!(tool = %self.tool, key = %key, error = %e, "Failed to write durable store");
            }
        }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Number of entries held in memory
    pub fn volatile_len(&self) -> usize {
        self.volatile.len()
    }
}
