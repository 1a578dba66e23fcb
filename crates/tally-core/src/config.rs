//! Tally configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::DEFAULT_STORE_TIMEOUT_MS;

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Path of the file-backed key-value store
    pub store_path: PathBuf,

    /// Upper bound for a single store operation (milliseconds)
    pub store_timeout_ms: u64,

    /// PIN entry and lockout settings
    pub pin: PinSettings,

    /// Statistics cache settings
    pub cache: CacheSettings,
}

/// PIN entry and lockout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinSettings {
    /// Consecutive failures that trigger a lockout
    pub max_attempts: u32,
    /// Lockout length (seconds)
    pub lockout_secs: u64,
    /// Shortest accepted PIN
    pub min_length: usize,
    /// Longest accepted PIN
    pub max_length: usize,
}

/// Statistics cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL applied by the statistics service (milliseconds)
    pub default_ttl_ms: u64,
    /// Window after (re)validation during which an entry counts as fresh (milliseconds)
    pub freshness_window_ms: u64,
    /// Interval of the background expiry sweep (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            store_path: Self::default_store_path(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            pin: PinSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for PinSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lockout_secs: 300, // 5 minutes
            min_length: 4,
            max_length: 6,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_ms: 15 * 60 * 1000, // 15 minutes
            freshness_window_ms: 60 * 1000, // 1 minute
            sweep_interval_secs: 300,
        }
    }
}

impl TallyConfig {
    /// Default location of the store file
    pub fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("store.json")
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<()> {
        use crate::error::Error;

        if self.store_timeout_ms == 0 {
            return Err(Error::Config("store_timeout_ms must be positive".to_string()));
        }
        if self.pin.max_attempts == 0 {
            return Err(Error::Config("pin.max_attempts must be positive".to_string()));
        }
        if self.pin.min_length == 0 || self.pin.min_length > self.pin.max_length {
            return Err(Error::Config(format!(
                "invalid PIN length bounds {}-{}",
                self.pin.min_length, self.pin.max_length
            )));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(Error::Config("cache.sweep_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Store operation timeout
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl PinSettings {
    /// Lockout length
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }
}

impl CacheSettings {
    /// TTL applied by the statistics service
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Freshness window
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    /// Background sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
