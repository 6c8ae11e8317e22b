//! Configuration system for submitr.
//!
//! A single YAML file (explicit path, ~/.config/submitr/submitr.yml or
//! ./submitr.yml) with every section defaulted.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{
    BreakerOverride, BreakerSection, FallbackConfig, GlobalConfig, ProvidersConfig, QueueConfig, RetryConfig,
    SimulateConfig, StorageBackend, StorageConfig,
};

mod global;

/// Load configuration from the standard search paths.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
