//! Size-constrained image normalization.
//!
//! Every generated image is stretched to a fixed `width × round(width × ratio)`
//! canvas and JPEG-encoded, starting at quality 95 and stepping down until the
//! encoding fits the kilobyte budget or the quality floor is reached. When the
//! floor is hit first the floor encoding is returned as a best effort;
//! [`NormalizationResult::within_budget`] tells the two cases apart.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use mannequin_contracts::config::{NormalizeParams, MAX_QUALITY};
use tracing::debug;

use crate::error::NormalizeError;

const BYTES_PER_KILOBYTE: f64 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeAttempt {
    pub quality: u8,
    pub size_kb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationResult {
    pub bytes: Vec<u8>,
    pub size_kb: f64,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub budget_kb: f64,
    /// Every encode pass in order; the last one is the returned encoding.
    pub attempts: Vec<EncodeAttempt>,
}

impl NormalizationResult {
    pub fn within_budget(&self) -> bool {
        self.size_kb <= self.budget_kb
    }
}

pub fn normalize(
    image: &DynamicImage,
    params: &NormalizeParams,
) -> Result<NormalizationResult, NormalizeError> {
    params.validate()?;
    let width = params.target_width;
    let height = params.target_height();
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    let rgb = flatten_on_white(&resized);

    let floor = params.quality_floor;
    let mut quality = MAX_QUALITY;
    let mut attempts = Vec::with_capacity(params.max_attempts());
    loop {
        let bytes = encode_jpeg(&rgb, quality)?;
        let size_kb = bytes.len() as f64 / BYTES_PER_KILOBYTE;
        attempts.push(EncodeAttempt { quality, size_kb });
        debug!(quality, size_kb, budget_kb = params.max_kilobytes, "jpeg encode pass");

        if size_kb <= params.max_kilobytes || quality <= floor {
            return Ok(NormalizationResult {
                bytes,
                size_kb,
                quality,
                width,
                height,
                budget_kb: params.max_kilobytes,
                attempts,
            });
        }
        quality = quality.saturating_sub(params.quality_step).max(floor);
    }
}

/// Decodes `bytes` and normalizes the result.
pub fn normalize_bytes(
    bytes: &[u8],
    params: &NormalizeParams,
) -> Result<NormalizationResult, NormalizeError> {
    let image = image::load_from_memory(bytes).map_err(NormalizeError::Decode)?;
    normalize(&image, params)
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        encoder
            .encode_image(rgb)
            .map_err(|source| NormalizeError::Encode { quality, source })?;
    }
    Ok(bytes)
}

// JPEG has no alpha channel.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
