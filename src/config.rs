#[cfg(feature = "fs")]
use std::{fs, io::Write, path::Path};

#[cfg(feature = "fs")]
use tracing::debug;

use crate::{Error, Result};

/// Dispatch core configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
#[must_use]
pub struct Config {
    /// Maximum number of registered services.
    pub max_services: usize,
    /// Number of transmit failures after which the link is declared
    /// exhausted.
    pub tx_failure_limit: u32,
    /// Number of most recent transmit failures kept in the log.
    pub tx_log_capacity: usize,
}

impl Config {
    /// Returns the configuration with a different service capacity.
    #[inline]
    pub const fn with_max_services(mut self, n: usize) -> Self {
        self.max_services = n;
        self
    }

    /// Returns the configuration with a different transmit failure limit.
    #[inline]
    pub const fn with_tx_failure_limit(mut self, n: u32) -> Self {
        self.tx_failure_limit = n;
        self
    }

    /// Returns the configuration with a different failure log capacity.
    #[inline]
    pub const fn with_tx_log_capacity(mut self, n: usize) -> Self {
        self.tx_log_capacity = n;
        self
    }

    /// Checks that all limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_services == 0 {
            return Err(Error::Config("max_services must be non-zero"));
        }
        if self.tx_failure_limit == 0 {
            return Err(Error::Config("tx_failure_limit must be non-zero"));
        }
        if self.tx_log_capacity == 0 {
            return Err(Error::Config("tx_log_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Loads and validates a JSON configuration file. Missing fields take
    /// their default values.
    #[cfg(feature = "fs")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|e| fs_err(path, e))?;
        let cfg: Self = serde_json::from_str(&s).map_err(|e| fs_err(path, e))?;
        cfg.validate()?;
        debug!("Loaded configuration: {}", path.display());
        Ok(cfg)
    }

    /// Saves the configuration as pretty-printed JSON.
    #[cfg(feature = "fs")]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let s = serde_json::to_string_pretty(self).map_err(|e| fs_err(path, e))?;
        fs::File::create(path)
            .and_then(|mut f| f.write_all(s.as_bytes()).and_then(|_| f.sync_data()))
            .map_err(|e| fs_err(path, e))?;
        debug!("Wrote configuration: {}", path.display());
        Ok(())
    }
}

#[cfg(feature = "fs")]
fn fs_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::ConfigLoad(format!("{} ({e})", path.display()))
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            max_services: 8,
            tx_failure_limit: 100,
            tx_log_capacity: 100,
        }
    }
}
