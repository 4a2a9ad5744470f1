//! RGB565 framebuffer the screen collaborators draw into.

use super::{Rgb, Surface};
use crate::{Error, Result};

/// RGB565 framebuffer.
#[derive(Clone)]
pub struct Framebuffer {
    /// Pixel data in RGB565 format.
    data: Vec<u16>,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// Creates a framebuffer initialized to black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Returns the width of the framebuffer.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the framebuffer.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns a reference to the raw pixel data.
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Clears the framebuffer to a solid RGB565 color.
    pub fn clear(&mut self, color: u16) {
        self.data.fill(color);
    }

    /// Fills the framebuffer with an opaque RGB color.
    pub fn fill_rgb(&mut self, color: Rgb) {
        self.clear(rgb888_to_rgb565(color.r, color.g, color.b));
    }

    /// Gets a pixel at the given coordinates.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            Some(self.data[idx])
        } else {
            None
        }
    }

    /// Composites `surface` with its top-left corner at (`x`, `y`).
    ///
    /// The origin may be negative or past the edges; the part of the surface
    /// outside the framebuffer is clipped. Alpha 255 replaces the pixel,
    /// alpha 0 leaves it, anything else blends.
    pub fn blit_rgba(&mut self, surface: &Surface, x: i32, y: i32) {
        let (sw, sh) = surface.dimensions();
        let x0 = i64::from(x).max(0);
        let y0 = i64::from(y).max(0);
        let x1 = (i64::from(x) + i64::from(sw)).min(i64::from(self.width));
        let y1 = (i64::from(y) + i64::from(sh)).min(i64::from(self.height));

        for dy in y0..y1 {
            for dx in x0..x1 {
                let sx = (dx - i64::from(x)) as u32;
                let sy = (dy - i64::from(y)) as u32;
                let [r, g, b, a] = surface.get_pixel(sx, sy).0;
                let idx = dy as usize * self.width as usize + dx as usize;
                self.data[idx] = match a {
                    0 => continue,
                    255 => rgb888_to_rgb565(r, g, b),
                    _ => {
                        let (br, bg, bb) = rgb565_to_rgb888(self.data[idx]);
                        rgb888_to_rgb565(blend(r, br, a), blend(g, bg, a), blend(b, bb, a))
                    }
                };
            }
        }
    }

    /// Converts the framebuffer to RGBA8 bytes for PNG encoding.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.data.len() * 4);
        for &pixel in &self.data {
            let (r, g, b) = rgb565_to_rgb888(pixel);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
        rgba
    }

    /// Raw little-endian RGB565 bytes, as a 16bpp fbdev expects them.
    pub fn to_rgb565_le(&self) -> Vec<u8> {
        self.data.iter().flat_map(|p| p.to_le_bytes()).collect()
    }
}

#[inline]
fn blend(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = u16::from(alpha);
    ((u16::from(src) * a + u16::from(dst) * (255 - a)) / 255) as u8
}

/// Converts RGB888 to RGB565.
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = (r >> 3) as u16;
    let g6 = (g >> 2) as u16;
    let b5 = (b >> 3) as u16;
    (r5 << 11) | (g6 << 5) | b5
}

/// Converts RGB565 to RGB888.
#[inline]
pub fn rgb565_to_rgb888(pixel: u16) -> (u8, u8, u8) {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    // Expand to 8-bit
    let r8 = (r << 3) | (r >> 2);
    let g8 = (g << 2) | (g >> 4);
    let b8 = (b << 3) | (b >> 2);
    (r8, g8, b8)
}

/// Parses a hex color string ("#RRGGBB" or "RRGGBB").
pub fn parse_hex_color(hex: &str) -> Result<Rgb> {
    let digits = hex.trim_start_matches('#');
    let invalid = || Error::InvalidColor(hex.to_string());
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
    };
    Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
