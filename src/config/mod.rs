//! Configuration management.
//!
//! Hierarchical resolution: built-in defaults → global config
//! (`~/.config/deckmind/config.toml`) → project config
//! (`.deckmind/config.toml`) → environment variables (`DECKMIND_*`).

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
