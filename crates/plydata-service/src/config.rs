// ABOUTME: Configuration loading for the plydata service layer.
// ABOUTME: Reads environment variables with defaults and validates the sweep interval.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PLYDATA_SWEEP_INTERVAL_SECS is not a positive integer: {0}")]
    InvalidSweepInterval(String),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub sweep_interval: Duration,
}

impl ServiceConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - PLYDATA_DATA_DIR: directory holding the store files (default: ./data)
    /// - PLYDATA_STATIC_DIR: directory of read-only reference JSON (optional)
    /// - PLYDATA_SWEEP_INTERVAL_SECS: cache sweep period (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("PLYDATA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let static_dir = std::env::var("PLYDATA_STATIC_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let sweep_interval = match std::env::var("PLYDATA_SWEEP_INTERVAL_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or(ConfigError::InvalidSweepInterval(raw))?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(300),
        };

        Ok(Self {
            data_dir,
            static_dir,
            sweep_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test mutates the process environment, so defaults and rejection
    // are checked in sequence rather than as parallel tests.
    #[test]
    fn config_defaults_and_sweep_interval_validation() {
        // SAFETY: test-only code, no other test touches these variables
        unsafe {
            std::env::remove_var("PLYDATA_DATA_DIR");
            std::env::remove_var("PLYDATA_STATIC_DIR");
            std::env::remove_var("PLYDATA_SWEEP_INTERVAL_SECS");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.static_dir.is_none());
        assert_eq!(config.sweep_interval, Duration::from_secs(300));

        // SAFETY: test-only code, no other test touches these variables
        unsafe {
            std::env::set_var("PLYDATA_SWEEP_INTERVAL_SECS", "zero");
        }
        let result = ServiceConfig::from_env();
        // SAFETY: test-only code, no other test touches these variables
        unsafe {
            std::env::remove_var("PLYDATA_SWEEP_INTERVAL_SECS");
        }
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSweepInterval(raw)) if raw == "zero"
        ));
    }
}
