//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    expand_path, load_config, Config, ConfigError, DatabaseSection, FeedSection,
    FilterSection, JupiterSection, LoggingSection, MonitorSection,
};
