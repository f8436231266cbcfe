//! Terminal configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use usbcon::SessionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermConfig {
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Low-level session tuning
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSettings {
    pub log_level: String,
    /// How long each device read waits before the worker services commands
    #[serde(default = "TerminalSettings::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl TerminalSettings {
    fn default_read_timeout_ms() -> u64 {
        100
    }
}

/// Device to open when none is given on the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ID, e.g. "0x04f9"
    #[serde(default)]
    pub vendor_id: Option<String>,
    /// Product ID, e.g. "0x2042"
    #[serde(default)]
    pub product_id: Option<String>,
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            terminal: TerminalSettings {
                log_level: "info".to_string(),
                read_timeout_ms: TerminalSettings::default_read_timeout_ms(),
            },
            usb: UsbSettings::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No usable file; carries the reason
    Defaults(String),
}

impl ConfigSource {
    /// Report the source; loading happens before logging is set up
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                tracing::info!("Loaded configuration from: {}", path.display())
            }
            ConfigSource::Defaults(reason) => {
                tracing::warn!("Failed to load config: {}, using defaults", reason)
            }
        }
    }
}

impl TermConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<(Self, ConfigSource)> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-term/term.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: TermConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        Ok((config, ConfigSource::File(config_path)))
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> (Self, ConfigSource) {
        Self::load(None).unwrap_or_else(Self::fallback)
    }

    fn fallback(e: anyhow::Error) -> (Self, ConfigSource) {
        (Self::default(), ConfigSource::Defaults(format!("{:#}", e)))
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-term").join("term.toml")
        } else {
            PathBuf::from(".config/usb-term/term.toml")
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.terminal.read_timeout_ms)
    }

    /// Configured target device, if both IDs are set
    pub fn device(&self) -> Result<Option<(u16, u16)>> {
        match (&self.usb.vendor_id, &self.usb.product_id) {
            (Some(vid), Some(pid)) => Ok(Some((
                parse_hex_id(vid, "VID")?,
                parse_hex_id(pid, "PID")?,
            ))),
            (None, None) => Ok(None),
            _ => Err(anyhow!("Both usb.vendor_id and usb.product_id must be set")),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.terminal.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.terminal.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.terminal.read_timeout_ms == 0 {
            return Err(anyhow!("terminal.read_timeout_ms must be greater than 0"));
        }
        if self.session.write_timeout_ms == 0 {
            return Err(anyhow!("session.write_timeout_ms must be greater than 0"));
        }

        self.device()?;
        Ok(())
    }
}

/// Parse a hex ID (VID or PID) of the form "0x1234"
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
            name,
            id
        ));
    };

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Parse a `VID:PID` device argument as printed by `--list-devices`
///
/// Both halves are hex, with or without a `0x` prefix.
pub fn parse_device_arg(arg: &str) -> Result<(u16, u16)> {
    let Some((vid, pid)) = arg.split_once(':') else {
        return Err(anyhow!(
            "Invalid device '{}', expected VID:PID (e.g., '04f9:2042')",
            arg
        ));
    };

    let normalize = |part: &str| {
        if part.starts_with("0x") || part.starts_with("0X") {
            part.to_string()
        } else {
            format!("0x{}", part)
        }
    };

    Ok((
        parse_hex_id(&normalize(vid), "VID")?,
        parse_hex_id(&normalize(pid), "PID")?,
    ))
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}
