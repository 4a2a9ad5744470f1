//! Configuration management.

use anyhow::{Context, Result};
use infree_panel_core::{MAX_FRAME, QUEUE_CAPACITY, SCREEN_HEIGHT, SCREEN_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Host link
    #[serde(default)]
    pub transport: TransportConfig,

    /// Framing limits
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Panel output
    #[serde(default)]
    pub display: DisplayConfig,

    /// Backlight control
    #[serde(default)]
    pub backlight: BacklightConfig,

    /// Reboot and watchdog
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Serial/USB gadget transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// TTY the host talks to
    #[serde(default = "default_transport_device")]
    pub device: String,

    /// Line rate (ignored by CDC-ACM gadgets)
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: default_transport_device(),
            baud: default_baud(),
        }
    }
}

/// Frame and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Largest frame accepted, in bytes
    #[serde(default = "default_max_frame")]
    pub max_frame: usize,

    /// Byte queue capacity, in bytes
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame: default_max_frame(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// How presented frames leave the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw little-endian RGB565 written to a 16bpp framebuffer device.
    #[default]
    Fbdev,
    /// PNG snapshot, for running without a panel.
    Png,
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Framebuffer device or snapshot path
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            output: default_output(),
            format: OutputFormat::default(),
        }
    }
}

/// Backlight configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacklightConfig {
    /// sysfs backlight directory; unset logs the level only
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Program and arguments that reboot into FEL mode
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,

    /// Watchdog device to keep alive; unset disables the watchdog task
    #[serde(default)]
    pub watchdog: Option<PathBuf>,

    /// Watchdog refresh interval in milliseconds
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reboot_command: default_reboot_command(),
            watchdog: None,
            watchdog_interval: default_watchdog_interval(),
        }
    }
}

// Default value functions
fn default_transport_device() -> String {
    "/dev/ttyGS0".to_string()
}

fn default_baud() -> u32 {
    infree_panel_core::link::DEFAULT_BAUD
}

fn default_max_frame() -> usize {
    MAX_FRAME
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_width() -> u32 {
    SCREEN_WIDTH
}

fn default_height() -> u32 {
    SCREEN_HEIGHT
}

fn default_output() -> PathBuf {
    PathBuf::from("/dev/fb0")
}

fn default_reboot_command() -> Vec<String> {
    vec!["reboot".to_string(), "fel".to_string()]
}

fn default_watchdog_interval() -> u64 {
    1000
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses and validates configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let protocol = &self.protocol;
        if protocol.max_frame < 16 {
            anyhow::bail!("protocol.max_frame must be at least 16 bytes");
        }
        if protocol.queue_capacity < protocol.max_frame {
            anyhow::bail!("protocol.queue_capacity must hold at least one max_frame");
        }
        if self.display.width == 0 || self.display.height == 0 {
            anyhow::bail!("display dimensions must be non-zero");
        }
        if self.lifecycle.reboot_command.is_empty() {
            anyhow::bail!("lifecycle.reboot_command must name a program");
        }
        if self.lifecycle.watchdog_interval == 0 {
            anyhow::bail!("lifecycle.watchdog_interval must be at least 1 ms");
        }
        Ok(())
    }
}
