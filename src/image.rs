//! Image preprocessing for vision requests.
//!
//! Uploaded images are decoded, flattened to 3-channel RGB (alpha is
//! dropped), shrunk so neither side exceeds `image.max_dimension` (never
//! enlarged, aspect ratio kept, Lanczos3 filter), re-encoded as JPEG and
//! base64-encoded for an inline `data:image/jpeg;base64,...` URL.

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageError;
use tracing::{debug, warn};

use crate::config::ImageConfig;

/// Normalize an uploaded image. Returns `None` (and logs) if the bytes
/// cannot be decoded or re-encoded; the request then continues text-only.
pub fn preprocess(bytes: &[u8], config: &ImageConfig) -> Option<String> {
    match normalize_jpeg(bytes, config) {
        Ok(jpeg) => {
            debug!("image normalized: {} -> {} bytes", bytes.len(), jpeg.len());
            Some(base64::engine::general_purpose::STANDARD.encode(jpeg))
        }
        Err(e) => {
            warn!("image preprocessing failed, continuing without image: {}", e);
            None
        }
    }
}

/// Decode, resize and re-encode as JPEG.
pub fn normalize_jpeg(bytes: &[u8], config: &ImageConfig) -> Result<Vec<u8>, ImageError> {
    let mut img = image::load_from_memory(bytes)?;

    let max = config.max_dimension;
    if img.width() > max || img.height() > max {
        img = img.resize(max, max, FilterType::Lanczos3);
    }
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, config.jpeg_quality);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn config(max_dimension: u32) -> ImageConfig {
        ImageConfig {
            max_dimension,
            jpeg_quality: 80,
        }
    }

    #[test]
    fn test_downscales_preserving_aspect_ratio() {
        let jpeg = normalize_jpeg(&png(400, 100), &config(200)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 50));
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_never_upscales() {
        let jpeg = normalize_jpeg(&png(60, 30), &config(200)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (60, 30));
        assert_eq!(decoded.color().channel_count(), 3);
    }

    #[test]
    fn test_preprocess_returns_base64() {
        let encoded = preprocess(&png(10, 10), &config(1600)).unwrap();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(&raw[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_corrupt_image_is_none() {
        assert!(preprocess(b"definitely not an image", &config(1600)).is_none());
        assert!(preprocess(&[], &config(1600)).is_none());
    }
}
