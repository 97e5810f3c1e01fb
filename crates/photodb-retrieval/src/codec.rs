//! Image decode and resize

use crate::error::Result;
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;

/// Decoded pixel data
pub type PixelBuffer = image::DynamicImage;

/// Decode and resize capability consumed by sessions and the thumbnail
/// lister.
pub trait Codec: Send + Sync {
    /// Decode an encoded image from memory.
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer>;

    /// Scale so the short side lands exactly on `short_side`, preserving
    /// aspect ratio.
    fn resize(&self, image: &PixelBuffer, short_side: u32) -> PixelBuffer;

    /// Re-encode as JPEG (thumbnail payloads are stored encoded).
    fn encode_jpeg(&self, image: &PixelBuffer) -> Result<Vec<u8>>;
}

/// [`Codec`] backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
        Ok(image::load_from_memory(bytes)?)
    }

    fn resize(&self, image: &PixelBuffer, short_side: u32) -> PixelBuffer {
        let (w, h) = (image.width(), image.height());
        let target = short_side.max(1);
        let (new_w, new_h) = if w <= h {
            (target, scaled(h, w, target))
        } else {
            (scaled(w, h, target), target)
        };
        if (new_w, new_h) == (w, h) {
            return image.clone();
        }
        image.resize_exact(new_w, new_h, FilterType::Lanczos3)
    }

    fn encode_jpeg(&self, image: &PixelBuffer) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        // JPEG has no alpha; flatten before encoding
        let rgb = PixelBuffer::ImageRgb8(image.to_rgb8());
        rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
        Ok(buf)
    }
}

fn scaled(long: u32, short: u32, target: u32) -> u32 {
    ((long as u64 * target as u64) / short as u64).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn test_image(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        test_image(w, h)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_png() {
        let codec = ImageCodec;
        let img = codec.decode(&png_bytes(128, 64)).unwrap();
        assert_eq!((img.width(), img.height()), (128, 64));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = ImageCodec;
        assert!(codec.decode(b"not an image").is_err());
    }

    #[test]
    fn test_resize_landscape_short_side() {
        let codec = ImageCodec;
        let img = test_image(200, 100);
        let resized = codec.resize(&img, 50);
        assert_eq!((resized.width(), resized.height()), (100, 50));
    }

    #[test]
    fn test_resize_portrait_short_side() {
        let codec = ImageCodec;
        let img = test_image(100, 200);
        let resized = codec.resize(&img, 50);
        assert_eq!((resized.width(), resized.height()), (50, 100));
    }

    #[test]
    fn test_resize_already_at_target_is_identity() {
        let codec = ImageCodec;
        let img = test_image(128, 64);
        let resized = codec.resize(&img, 64);
        assert_eq!((resized.width(), resized.height()), (128, 64));
    }

    #[test]
    fn test_encode_jpeg_round_trips() {
        let codec = ImageCodec;
        let img = test_image(32, 16);
        let jpeg = codec.encode_jpeg(&img).unwrap();
        let back = codec.decode(&jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (32, 16));
    }
}
