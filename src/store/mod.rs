//! Durable tier for inspection results
//!
//! The inspector only depends on [`DurableStore`]; callers plug in their own
//! database, or use [`FileStore`] for a JSON-file backed store.

mod file;

pub use file::FileStore;

use crate::cache::CacheKey;
use crate::error::InspectResult;
use crate::inspection::ToolKind;
use async_trait::async_trait;

/// Persistence for one result schema, scoped by tool
#[async_trait]
pub trait DurableStore<T>: Send + Sync {
    /// Load a stored result, `Ok(None)` when nothing is stored for the key
    async fn get(&self, tool: ToolKind, key: &CacheKey) -> InspectResult<Option<T>>;

    /// Store a result, replacing any previous value for the key
    async fn set(&self, tool: ToolKind, key: &CacheKey, value: &T) -> InspectResult<()>;
}
