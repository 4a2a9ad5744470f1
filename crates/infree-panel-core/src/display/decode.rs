//! JPEG/PNG decoding for the blit commands.

use image::ImageFormat;

use super::Surface;
use crate::Result;

/// Image container carried by a blit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        }
    }
}

/// Decodes `bytes` as `kind` into an RGBA surface.
///
/// The format comes from the command, not from sniffing the data, so a PNG
/// sent with the JPEG opcode fails to decode.
pub fn decode(bytes: &[u8], kind: ImageKind) -> Result<Surface> {
    let image = image::load_from_memory_with_format(bytes, kind.format())?;
    Ok(image.into_rgba8())
}

/// Origin that centres an `image`-sized surface on a `screen`-sized one.
///
/// Negative when the image is larger than the screen.
pub fn centered_origin(screen: (u32, u32), image: (u32, u32)) -> (i32, i32) {
    let x = (i64::from(screen.0) - i64::from(image.0)) / 2;
    let y = (i64::from(screen.1) - i64::from(image.1)) / 2;
    (x as i32, y as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = Surface::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .write_to(&mut out, format)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let bytes = encoded(5, 3, ImageFormat::Png);
        let surface = decode(&bytes, ImageKind::Png).unwrap();
        assert_eq!(surface.dimensions(), (5, 3));
        assert_eq!(surface.get_pixel(4, 2), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_jpeg() {
        let bytes = encoded(16, 8, ImageFormat::Jpeg);
        let surface = decode(&bytes, ImageKind::Jpeg).unwrap();
        assert_eq!(surface.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_wrong_kind() {
        let bytes = encoded(4, 4, ImageFormat::Png);
        assert!(decode(&bytes, ImageKind::Jpeg).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode(&[0x89, b'P', b'N', b'G', 0, 1, 2], ImageKind::Png).is_err());
        assert!(decode(&[], ImageKind::Jpeg).is_err());
    }

    #[test]
    fn test_centered_origin() {
        assert_eq!(centered_origin((320, 240), (100, 50)), (110, 95));
        assert_eq!(centered_origin((320, 240), (321, 240)), (0, 0));
        assert_eq!(centered_origin((320, 240), (400, 300)), (-40, -30));
        assert_eq!(centered_origin((320, 240), (323, 241)), (-1, 0));
    }
}
