//! Result caching for inspections
//!
//! Lookups go through two tiers:
//!
//! | Tier | Lifetime | Failure handling |
//! |------|----------|------------------|
//! | Volatile | Process | Cannot fail |
//! | Durable | External store | Read error = miss, write error = warning |
//!
//! Concurrent full inspections of one key are coalesced by the
//! [`InflightTracker`] so only one runs at a time per key.

pub mod inflight;
pub mod key;
pub mod tiered;
pub mod volatile;

pub use inflight::{InflightTracker, Role};
pub use key::CacheKey;
pub use tiered::TieredCache;
pub use volatile::VolatileCache;
