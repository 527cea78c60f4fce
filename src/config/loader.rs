//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching
//! config/tracker.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::jupiter::{JupiterConfig, DEFAULT_SLIPPAGE_BPS};
use crate::adapters::pump_fun::{ConnectionConfig, ReconnectPolicy, DEFAULT_WS_URL};
use crate::application::PriceMonitorConfig;
use crate::domain::QualificationFilter;
use crate::ports::{DEFAULT_PROBE_LAMPORTS, SOL_MINT};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure matching tracker.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    pub filter: FilterSection,
    #[serde(default)]
    pub jupiter: JupiterSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Launch feed configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSection {
    /// PumpPortal WebSocket URL
    pub url: String,
    /// Delay before reconnecting after a disconnect
    pub reconnect_delay_secs: u64,
    /// When set, the delay doubles per failed attempt up to this cap
    pub reconnect_max_delay_secs: Option<u64>,
    /// Reconnect after this many seconds without a frame (0 = disabled)
    pub idle_timeout_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            reconnect_delay_secs: 5,
            reconnect_max_delay_secs: None,
            idle_timeout_secs: 0,
        }
    }
}

impl FeedSection {
    /// Get feed URL with environment variable override
    /// Checks FEED_URL env var first, falls back to config value
    pub fn get_url(&self) -> String {
        self.resolve_url(std::env::var("FEED_URL").ok())
    }

    fn resolve_url(&self, env_url: Option<String>) -> String {
        env_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let base = Duration::from_secs(self.reconnect_delay_secs);
        match self.reconnect_max_delay_secs {
            Some(max) => ReconnectPolicy::Exponential {
                base,
                max: Duration::from_secs(max),
            },
            None => ReconnectPolicy::Fixed(base),
        }
    }
}

/// Price monitor configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Seconds between price polling rounds
    pub interval_secs: u64,
    /// Most recent tokens polled per round
    pub queue_size: usize,
    /// Lamports quoted per price check
    pub probe_amount_lamports: u64,
    /// Slippage tolerance in basis points for probe quotes
    pub slippage_bps: u16,
    /// Per-quote deadline in seconds (0 = none)
    pub quote_timeout_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            queue_size: 50,
            probe_amount_lamports: DEFAULT_PROBE_LAMPORTS,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            quote_timeout_secs: 0,
        }
    }
}

/// Qualification thresholds for new tokens
#[derive(Debug, Clone, Deserialize)]
pub struct FilterSection {
    /// Minimum market cap in SOL at creation
    pub min_market_cap_sol: f64,
    /// Minimum SOL in the bonding curve at creation
    pub min_liquidity_sol: f64,
}

/// Jupiter API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JupiterSection {
    /// Jupiter API base URL
    pub api_url: String,
    /// Optional API key for higher rate limits (get from jup.ag)
    pub api_key: Option<String>,
    /// HTTP request timeout
    pub timeout_secs: u64,
    /// Attempts per quote on 429/5xx
    pub max_retries: u32,
}

impl Default for JupiterSection {
    fn default() -> Self {
        let defaults = JupiterConfig::default();
        Self {
            api_url: defaults.api_base_url,
            api_key: None,
            timeout_secs: defaults.timeout.as_secs(),
            max_retries: defaults.max_retries,
        }
    }
}

impl JupiterSection {
    /// Get API key with environment variable fallback
    /// Checks JUPITER_API_KEY env var if config value is empty/None
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var("JUPITER_API_KEY").ok()
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite database file; `~` is expanded
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/tracker.db".to_string(),
        }
    }
}

impl DatabaseSection {
    /// Get database path with environment variable override
    /// Checks DATABASE_PATH env var first, falls back to config value
    pub fn get_path(&self) -> PathBuf {
        let raw = std::env::var("DATABASE_PATH").unwrap_or_else(|_| self.path.clone());
        expand_path(&raw)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(expand_path(&path.as_ref().to_string_lossy()))?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Expand a leading `~` to the home directory
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Feed
        validate_feed_url(&self.feed.get_url())?;

        if self.feed.reconnect_delay_secs == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect_delay_secs must be > 0".to_string(),
            ));
        }

        if let Some(max) = self.feed.reconnect_max_delay_secs {
            if max < self.feed.reconnect_delay_secs {
                return Err(ConfigError::ValidationError(format!(
                    "reconnect_max_delay_secs ({}) must be >= reconnect_delay_secs ({})",
                    max, self.feed.reconnect_delay_secs
                )));
            }
        }

        // Monitor
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "interval_secs must be > 0".to_string(),
            ));
        }

        if self.monitor.queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "queue_size must be > 0".to_string(),
            ));
        }

        if self.monitor.probe_amount_lamports == 0 {
            return Err(ConfigError::ValidationError(
                "probe_amount_lamports must be > 0".to_string(),
            ));
        }

        if self.monitor.slippage_bps > 10_000 {
            return Err(ConfigError::ValidationError(format!(
                "slippage_bps must be 0-10000, got {}",
                self.monitor.slippage_bps
            )));
        }

        // Filter
        for (name, value) in [
            ("min_market_cap_sol", self.filter.min_market_cap_sol),
            ("min_liquidity_sol", self.filter.min_liquidity_sol),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        // Jupiter
        if self.jupiter.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api_url cannot be empty".to_string(),
            ));
        }

        if self.jupiter.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be >= 1".to_string(),
            ));
        }

        if self.jupiter.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        // Database
        if self.database.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "database path cannot be empty".to_string(),
            ));
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}

/// The feed URL in effect, after env override, must be a WebSocket URL
fn validate_feed_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "feed url must be a ws:// or wss:// URL, got '{}'",
            url
        )))
    }
}

impl From<&Config> for ConnectionConfig {
    fn from(config: &Config) -> Self {
        ConnectionConfig {
            ws_url: config.feed.get_url(),
            reconnect: config.feed.reconnect_policy(),
            idle_timeout: config.feed.idle_timeout(),
        }
    }
}

impl From<&Config> for PriceMonitorConfig {
    fn from(config: &Config) -> Self {
        let timeout = config.monitor.quote_timeout_secs;
        PriceMonitorConfig {
            interval: Duration::from_secs(config.monitor.interval_secs),
            queue_size: config.monitor.queue_size,
            probe_amount: config.monitor.probe_amount_lamports,
            base_mint: SOL_MINT.to_string(),
            quote_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        }
    }
}

impl From<&Config> for JupiterConfig {
    fn from(config: &Config) -> Self {
        JupiterConfig {
            api_base_url: config.jupiter.api_url.clone(),
            api_key: config.jupiter.get_api_key(),
            timeout: Duration::from_secs(config.jupiter.timeout_secs),
            max_retries: config.jupiter.max_retries,
            slippage_bps: config.monitor.slippage_bps,
        }
    }
}

impl From<&Config> for QualificationFilter {
    fn from(config: &Config) -> Self {
        QualificationFilter::new(
            config.filter.min_market_cap_sol,
            config.filter.min_liquidity_sol,
        )
    }
}
