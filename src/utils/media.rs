//! Media pipeline: uploaded images are re-encoded to a bounded JPEG and put
//! into an S3-compatible bucket; the stored object's public URL goes into the
//! row. No originals are kept.

use std::io::Cursor;

use aws_sdk_s3::primitives::ByteStream;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use uuid::Uuid;

/// Longest edge after re-encode.
const MAX_DIMENSION: u32 = 800;
const JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("unreadable image: {0}")]
    Decode(image::ImageError),
    #[error("re-encode failed: {0}")]
    Encode(image::ImageError),
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Decode any supported format and re-encode as JPEG, scaled to fit within
/// MAX_DIMENSION on both axes (aspect ratio preserved, never upscaled).
pub fn optimize_image(bytes: &[u8]) -> Result<Vec<u8>, MediaError> {
    let img = image::load_from_memory(bytes).map_err(MediaError::Decode)?;
    let img = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .map_err(MediaError::Encode)?;
    Ok(out.into_inner())
}

pub struct MediaStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl MediaStore {
    pub async fn from_env(bucket: String, public_base_url: String) -> Self {
        let cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&cfg),
            bucket,
            public_base_url,
        }
    }

    /// Store an already-optimized JPEG under `{prefix}/{uuid}.jpg` and return
    /// its public URL.
    pub async fn store_jpeg(&self, prefix: &str, bytes: Vec<u8>) -> Result<String, MediaError> {
        let key = format!("{}/{}.jpg", prefix, Uuid::new_v4());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("image/jpeg")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| MediaError::Upload(e.to_string()))?;
        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([120, 30, 200, 255]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn oversized_image_is_scaled_down_to_jpeg() {
        let jpeg = optimize_image(&sample_png(1600, 1200)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert!(decoded.width() <= MAX_DIMENSION);
        assert!(decoded.height() <= MAX_DIMENSION);
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn small_image_keeps_its_dimensions() {
        let jpeg = optimize_image(&sample_png(200, 100)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            optimize_image(b"not an image"),
            Err(MediaError::Decode(_))
        ));
    }
}
