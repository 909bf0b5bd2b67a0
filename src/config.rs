//! Configuration for request controllers
//!
//! Immutable per controller instance once built.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Deadline for each flight. `Duration::ZERO` disables the timer outright.
    pub timeout: Duration,

    /// Run a warm-up probe before every send.
    pub probe_before_send: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            probe_before_send: false,
        }
    }
}

impl ControllerConfig {
    /// The timer to schedule, if any. Zero means no timer at all.
    pub fn effective_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: ControllerConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Disable the deadline entirely.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = Duration::ZERO;
        self
    }

    pub fn probe_before_send(mut self, enabled: bool) -> Self {
        self.config.probe_before_send = enabled;
        self
    }

    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

/// Load configuration from environment variables
pub fn from_env() -> ControllerConfig {
    let mut config = ControllerConfig::default();

    if let Ok(ms) = std::env::var("SINGLE_FLIGHT_TIMEOUT_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            config.timeout = Duration::from_millis(ms);
        }
    }

    if let Ok(probe) = std::env::var("SINGLE_FLIGHT_PROBE_BEFORE_SEND") {
        config.probe_before_send = probe.to_lowercase() == "true" || probe == "1";
    }

    config
}

/// Load configuration from a TOML file
pub fn from_file(
    path: impl AsRef<std::path::Path>,
) -> Result<ControllerConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ControllerConfig = toml::from_str(&contents)?;
    Ok(config)
}
