//! Panel screen: an RGB565 framebuffer plus the sink it is presented to.

use infree_panel_core::display::Framebuffer;
use infree_panel_core::{Rgb, Screen, Surface};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{DisplayConfig, OutputFormat};

/// Screen backed by a Linux framebuffer device or a PNG snapshot file.
pub struct PanelScreen {
    framebuffer: Framebuffer,
    output: PathBuf,
    format: OutputFormat,
}

impl PanelScreen {
    /// Creates a screen cleared to black.
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            framebuffer: Framebuffer::new(config.width, config.height),
            output: config.output.clone(),
            format: config.format,
        }
    }

    /// The composited image.
    #[cfg(test)]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    fn write_fbdev(&self) -> std::io::Result<()> {
        let mut device = OpenOptions::new().write(true).open(&self.output)?;
        device.write_all(&self.framebuffer.to_rgb565_le())?;
        device.flush()
    }

    fn write_png(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(&self.output)?;
        let writer = BufWriter::new(file);

        let mut encoder =
            png::Encoder::new(writer, self.framebuffer.width(), self.framebuffer.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header().map_err(std::io::Error::other)?;
        writer
            .write_image_data(&self.framebuffer.to_rgba8())
            .map_err(std::io::Error::other)
    }
}

impl Screen for PanelScreen {
    fn size(&self) -> (u32, u32) {
        (self.framebuffer.width(), self.framebuffer.height())
    }

    fn clear(&mut self, color: Rgb) {
        self.framebuffer.fill_rgb(color);
    }

    fn blit(&mut self, surface: &Surface, x: i32, y: i32) {
        self.framebuffer.blit_rgba(surface, x, y);
    }

    fn present(&mut self) -> infree_panel_core::Result<()> {
        match self.format {
            OutputFormat::Fbdev => self.write_fbdev()?,
            OutputFormat::Png => self.write_png()?,
        }
        debug!("Presented to {}", self.output.display());
        Ok(())
    }
}
