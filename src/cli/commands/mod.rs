//! CLI command implementations

pub mod config;
pub mod inspect;

pub use config::execute as config;
pub use inspect::execute as inspect;
