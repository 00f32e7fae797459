use crate::upload::UploadFile;
use bytes::Bytes;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use thiserror::Error;

/// Longest edge allowed after normalization. Phone cameras routinely produce
/// 4000px originals; the gallery never renders wider than this.
pub const MAX_IMAGE_DIMENSION: u32 = 1080;

/// Byte budget for a normalized image.
pub const MAX_IMAGE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("image decode failed: {0}")]
    Decode(image::ImageError),
    #[error("image encode failed: {0}")]
    Encode(image::ImageError),
    #[error("transcode worker failed: {0}")]
    Worker(String),
}

/// Normalize a file before it enters a transfer path.
///
/// Images are re-encoded to WebP, capped at [`MAX_IMAGE_DIMENSION`] on the
/// longest edge and [`MAX_IMAGE_BYTES`] total. Videos pass through unchanged.
/// The pixel work runs on the blocking pool so the event loop stays free.
pub async fn normalize(file: UploadFile) -> Result<UploadFile, TranscodeError> {
    if !file.is_image() {
        return Ok(file);
    }

    let name = file.name.clone();
    let data = file.data.clone();

    let encoded = tokio::task::spawn_blocking(move || shrink_image(&data))
        .await
        .map_err(|e| TranscodeError::Worker(e.to_string()))??;

    tracing::debug!(
        "Transcode: {} {} -> {} bytes",
        name,
        file.data.len(),
        encoded.len()
    );

    Ok(UploadFile::new(
        webp_name(&name),
        "image/webp",
        Bytes::from(encoded),
    ))
}

/// Decode, cap dimensions, encode WebP. If the lossless encoding still busts
/// the byte budget, shrink by steps of 20% until it fits or the image would
/// drop below a usable size.
fn shrink_image(data: &[u8]) -> Result<Vec<u8>, TranscodeError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TranscodeError::Decode(image::ImageError::IoError(e)))?
        .decode()
        .map_err(TranscodeError::Decode)?;

    let mut limit = MAX_IMAGE_DIMENSION;
    loop {
        let scaled = cap_dimensions(&img, limit);
        let encoded = encode_webp(&scaled)?;

        let (w, h) = scaled.dimensions();
        if encoded.len() as u64 <= MAX_IMAGE_BYTES || w.min(h) <= 320 {
            return Ok(encoded);
        }

        limit = (limit * 4) / 5;
    }
}

fn cap_dimensions(img: &DynamicImage, limit: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= limit && h <= limit {
        img.clone()
    } else {
        // thumbnail preserves aspect ratio
        img.thumbnail(limit, limit)
    }
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, TranscodeError> {
    let mut out = Vec::new();
    let encoder = WebPEncoder::new_lossless(&mut out);
    // WebP encoding rejects some color types; normalize to RGBA8 first
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    rgba.write_with_encoder(encoder)
        .map_err(TranscodeError::Encode)?;
    Ok(out)
}

fn webp_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.webp"),
        _ => format!("{name}.webp"),
    }
}
