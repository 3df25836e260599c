//! vmprobe - VM snapshot guest inspection
//!
//! Exposes vSphere snapshot disks as NBD endpoints, runs libguestfs
//! inspection tools against them, and caches the parsed results in memory
//! and on disk. Concurrent requests for the same snapshot share a single
//! inspection.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod inspection;
pub mod inspector;
pub mod session;
pub mod store;
pub mod ui;

pub use error::{InspectError, InspectResult};
pub use inspector::{InspectionTarget, Inspector, InspectorSet};
