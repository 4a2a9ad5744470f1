//! sysfs backlight control.

use infree_panel_core::{Backlight, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Brightness scale used by the dispatch loop.
const SCALE: u32 = 1000;

/// Backlight behind `/sys/class/backlight/<name>`.
///
/// Without a path the level is only logged, for running off-target.
pub struct SysfsBacklight {
    path: Option<PathBuf>,
    max_brightness: u32,
}

impl SysfsBacklight {
    /// Opens the backlight directory and reads its `max_brightness`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No backlight configured; brightness changes are logged only");
            return Ok(Self {
                path: None,
                max_brightness: SCALE,
            });
        };

        let raw = std::fs::read_to_string(path.join("max_brightness"))?;
        let max_brightness = raw.trim().parse::<u32>().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad max_brightness: {:?}", raw.trim()),
            )
        })?;
        info!("Backlight at {} (max {})", path.display(), max_brightness);
        Ok(Self {
            path: Some(path.to_path_buf()),
            max_brightness,
        })
    }

    /// Maps a 0..=1000 value onto the device range.
    fn device_level(&self, value: u32) -> u32 {
        let value = u64::from(value.min(SCALE));
        (value * u64::from(self.max_brightness) / u64::from(SCALE)) as u32
    }
}

impl Backlight for SysfsBacklight {
    fn set_brightness(&mut self, value: u32) -> Result<()> {
        let level = self.device_level(value);
        match &self.path {
            Some(path) => {
                std::fs::write(path.join("brightness"), level.to_string())?;
                debug!("Backlight set to {} ({}/{})", value, level, self.max_brightness);
            }
            None => debug!("Backlight set to {}", value),
        }
        Ok(())
    }
}
