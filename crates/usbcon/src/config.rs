//! Session tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational settings for a [`crate::Session`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for each bulk OUT transfer in milliseconds
    #[serde(default = "SessionConfig::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Index of the configuration descriptor walked for endpoints
    #[serde(default)]
    pub config_index: u8,
    /// Whether to detach a kernel driver bound to the device
    #[serde(default = "SessionConfig::default_detach")]
    pub detach_kernel_driver: bool,
    /// Interface checked for an active kernel driver
    #[serde(default)]
    pub kernel_driver_interface: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: Self::default_write_timeout_ms(),
            config_index: 0,
            detach_kernel_driver: Self::default_detach(),
            kernel_driver_interface: 0,
        }
    }
}

impl SessionConfig {
    fn default_write_timeout_ms() -> u64 {
        1000
    }

    fn default_detach() -> bool {
        true
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
