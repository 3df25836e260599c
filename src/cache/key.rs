//! Cache keys for inspection results

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies one inspection request: a VM at a given snapshot.
///
/// Keys are not tool-scoped. Each inspector owns its own cache tiers, so
/// the same key may map to different results in different inspectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    vm_name: String,
    snapshot_name: String,
}

impl CacheKey {
    pub fn new(vm_name: impl Into<String>, snapshot_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            snapshot_name: snapshot_name.into(),
        }
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    pub fn snapshot_name(&self) -> &str {
        &self.snapshot_name
    }

    /// Hex SHA-256 over both length-prefixed names, stable across processes
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.vm_name, &self.snapshot_name] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vm_name, self.snapshot_name)
    }
}
