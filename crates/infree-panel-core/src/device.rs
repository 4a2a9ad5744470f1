//! Collaborators the dispatch loop drives.
//!
//! Each trait is the narrow interface to one outside subsystem. The daemon
//! implements them against the real transport, sysfs and framebuffer; tests
//! implement them with recording mocks.

use crate::display::{Rgb, Surface};
use crate::Result;

/// Return path to the host.
pub trait Transport {
    /// Sends the single acknowledgement byte.
    fn acknowledge(&mut self) -> Result<()>;
}

/// Display backlight.
pub trait Backlight {
    /// Sets the brightness on a 0..=1000 scale.
    fn set_brightness(&mut self, value: u32) -> Result<()>;
}

/// Composited screen surface.
pub trait Screen {
    /// Screen dimensions in pixels.
    fn size(&self) -> (u32, u32);

    /// Fills the whole screen with an opaque colour.
    fn clear(&mut self, color: Rgb);

    /// Composites `surface` at (`x`, `y`), clipping whatever falls outside.
    fn blit(&mut self, surface: &Surface, x: i32, y: i32);

    /// Pushes the composited image to the panel.
    fn present(&mut self) -> Result<()>;
}

/// Device lifecycle control.
pub trait Lifecycle {
    /// Reboots into the FEL bootloader. Never returns.
    fn reboot_to_bootloader(&mut self) -> !;
}
