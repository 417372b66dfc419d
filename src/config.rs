use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::RMP::Buffer::MAX_CAPACITY;

/// Transport settings shared by every process attached to one bus.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    #[serde(default = "defaults::name")]
    pub name: String,
    #[serde(default = "defaults::ring_buffer_size_kb")]
    pub ring_buffer_size_kb: u64,
    #[serde(default = "defaults::max_readers")]
    pub max_readers: u16,
    #[serde(default = "defaults::backpressure_sleep_ms")]
    pub backpressure_sleep_ms: u64,
    #[serde(default = "defaults::open_timeout_ms")]
    pub open_timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}='{value}' is not a valid number")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

mod defaults {
    pub fn name() -> String {
        "dmxp_bus".into()
    }

    pub fn ring_buffer_size_kb() -> u64 {
        4096
    }

    pub fn max_readers() -> u16 {
        8
    }

    pub fn backpressure_sleep_ms() -> u64 {
        5
    }

    pub fn open_timeout_ms() -> u64 {
        1000
    }
}

pub const ENV_NAME: &str = "DMXP_BUS_NAME";
pub const ENV_RINGBUF_SIZE_KB: &str = "DMXP_BUS_RINGBUF_SIZE_KB";
pub const ENV_READERS_MAX: &str = "DMXP_BUS_READERS_MAX";
pub const ENV_BACKPRESSURE_SLEEP_MS: &str = "DMXP_BUS_BACKPRESSURE_SLEEP_MS";
pub const ENV_OPEN_TIMEOUT_MS: &str = "DMXP_BUS_OPEN_TIMEOUT_MS";

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: defaults::name(),
            ring_buffer_size_kb: defaults::ring_buffer_size_kb(),
            max_readers: defaults::max_readers(),
            backpressure_sleep_ms: defaults::backpressure_sleep_ms(),
            open_timeout_ms: defaults::open_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TransportConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with any `DMXP_BUS_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Overlay values from `lookup`. Split from [`from_env`](Self::from_env)
    /// so callers can feed variables from somewhere other than the process.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_NAME) {
            self.name = name;
        }
        if let Some(v) = parse_var(&lookup, ENV_RINGBUF_SIZE_KB)? {
            self.ring_buffer_size_kb = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_READERS_MAX)? {
            self.max_readers = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BACKPRESSURE_SLEEP_MS)? {
            self.backpressure_sleep_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_OPEN_TIMEOUT_MS)? {
            self.open_timeout_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Ring buffer capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.ring_buffer_size_kb.saturating_mul(1024)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.contains('/') || self.name.contains('\0') {
            return Err(ConfigError::Invalid(format!(
                "segment name '{}' must be non-empty and contain no '/' or NUL",
                self.name
            )));
        }
        let capacity = self.capacity();
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "ring buffer size {} KB is not a power of two",
                self.ring_buffer_size_kb
            )));
        }
        if capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "ring buffer size {} KB exceeds the {} KB limit",
                self.ring_buffer_size_kb,
                MAX_CAPACITY >> 10
            )));
        }
        if self.max_readers == 0 {
            return Err(ConfigError::Invalid("max_readers must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}
