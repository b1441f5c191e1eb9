//! Codec leaf operations used by the pipeline stages.
//!
//! The pipeline treats decode, downsample and encode as opaque calls that
//! either produce a result or nothing. They are CPU-bound and always run
//! on the blocking thread pool.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Decoded, renderable bitmap.
pub type Bitmap = image::RgbaImage;

/// Codec primitives.
pub trait ThumbnailCodec: Send + Sync + 'static {
    /// Decode encoded bytes into a bitmap.
    fn decode(&self, bytes: &[u8]) -> Option<Bitmap>;

    /// Decode and resize so the longest edge is at most `max_dimension`.
    fn downsample(&self, bytes: &[u8], max_dimension: u32) -> Option<Bitmap>;

    /// Encode a bitmap. `has_alpha` selects the lossless path; `quality`
    /// (0.0 to 1.0) applies to the lossy path.
    fn encode(&self, bitmap: &Bitmap, quality: f32, has_alpha: bool) -> Option<Vec<u8>>;
}

/// True if any pixel is not fully opaque.
pub fn has_alpha(bitmap: &Bitmap) -> bool {
    bitmap.pixels().any(|p| p.0[3] < u8::MAX)
}

/// Codec backed by the `image` crate: PNG for translucent bitmaps, JPEG
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    fn read(bytes: &[u8]) -> Option<DynamicImage> {
        if bytes.is_empty() {
            return None;
        }
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        match reader.decode() {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(error = %e, size_bytes = bytes.len(), "Image decode failed");
                None
            }
        }
    }
}

impl ThumbnailCodec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Option<Bitmap> {
        Self::read(bytes).map(|image| image.to_rgba8())
    }

    fn downsample(&self, bytes: &[u8], max_dimension: u32) -> Option<Bitmap> {
        let image = Self::read(bytes)?;
        if image.width().max(image.height()) <= max_dimension {
            return Some(image.to_rgba8());
        }
        // resize() fits within the box and keeps the aspect ratio
        Some(
            image
                .resize(max_dimension, max_dimension, FilterType::Triangle)
                .to_rgba8(),
        )
    }

    fn encode(&self, bitmap: &Bitmap, quality: f32, has_alpha: bool) -> Option<Vec<u8>> {
        let (width, height) = bitmap.dimensions();
        let mut buffer = Vec::new();

        let result = if has_alpha {
            PngEncoder::new(&mut buffer).write_image(
                bitmap.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )
        } else {
            let rgb = DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();
            let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality).encode(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        };

        match result {
            Ok(()) => Some(buffer),
            Err(e) => {
                debug!(error = %e, width, height, has_alpha, "Image encode failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];

    fn opaque(width: u32, height: u32) -> Bitmap {
        Bitmap::from_pixel(width, height, Rgba([200, 100, 50, 255]))
    }

    fn png_bytes(bitmap: &Bitmap) -> Vec<u8> {
        ImageCodec.encode(bitmap, 1.0, true).unwrap()
    }

    #[test]
    fn test_has_alpha() {
        let mut bitmap = opaque(4, 4);
        assert!(!has_alpha(&bitmap));
        bitmap.put_pixel(1, 1, Rgba([0, 0, 0, 254]));
        assert!(has_alpha(&bitmap));
    }

    #[test]
    fn test_encode_selects_format_by_alpha() {
        let bitmap = opaque(8, 8);
        let jpeg = ImageCodec.encode(&bitmap, 0.8, false).unwrap();
        let png = ImageCodec.encode(&bitmap, 0.8, true).unwrap();

        assert!(jpeg.starts_with(JPEG_MAGIC));
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn test_downsample_preserves_aspect_ratio() {
        let source = png_bytes(&opaque(200, 100));
        let bitmap = ImageCodec.downsample(&source, 50).unwrap();
        assert_eq!(bitmap.dimensions(), (50, 25));
    }

    #[test]
    fn test_downsample_never_upscales() {
        let source = png_bytes(&opaque(200, 100));
        let bitmap = ImageCodec.downsample(&source, 400).unwrap();
        assert_eq!(bitmap.dimensions(), (200, 100));
    }

    #[test]
    fn test_decode_roundtrip_dimensions() {
        let encoded = ImageCodec.encode(&opaque(30, 20), 0.8, false).unwrap();
        let decoded = ImageCodec.decode(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (30, 20));
    }

    #[test]
    fn test_garbage_input() {
        assert!(ImageCodec.decode(b"not an image").is_none());
        assert!(ImageCodec.downsample(&[], 64).is_none());
    }
}
