//! Display side of the command channel.
//!
//! Holds the RGB565 framebuffer, the image decoders used by the blit
//! commands and the small colour/surface types shared with the dispatcher.

mod decode;
pub mod framebuffer;

pub use decode::{centered_origin, decode, ImageKind};
pub use framebuffer::{parse_hex_color, rgb565_to_rgb888, rgb888_to_rgb565, Framebuffer};

/// Decoded image, owned by one blit command and dropped after present.
pub type Surface = image::RgbaImage;

/// Opaque 24-bit colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}
