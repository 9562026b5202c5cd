use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{map_object, GenerationRequest, GenerationResponse, ImageProvider, InlineImage};

const DRYRUN_WIDTH: u32 = 832;
const DRYRUN_HEIGHT: u32 = 1248;

/// Offline provider: answers every request with a flat 2:3 PNG whose grey
/// tint is derived from the prompt.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationResponse> {
        let shade = shade_from_prompt(request.prompt);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            DRYRUN_WIDTH,
            DRYRUN_HEIGHT,
            Rgb([shade, shade, shade]),
        ));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .context("dryrun image encode failed")?;

        Ok(GenerationResponse {
            image: Some(InlineImage {
                bytes: out.into_inner(),
                mime_type: Some("image/png".to_string()),
            }),
            text: Some("dryrun".to_string()),
            provider_request: map_object(json!({
                "endpoint": "dryrun-native",
                "payload": {
                    "model": request.model,
                    "prompt": request.prompt,
                    "input_bytes": request.image.len(),
                    "input_mime_type": request.mime_type,
                }
            })),
            provider_response: map_object(json!({
                "status": "ok",
                "width": DRYRUN_WIDTH,
                "height": DRYRUN_HEIGHT,
            })),
            warnings: Vec::new(),
        })
    }
}

// Mid greys only, so the output always reads as a grey mannequin.
fn shade_from_prompt(prompt: &str) -> u8 {
    let digest = Sha256::digest(prompt.as_bytes());
    96 + digest[0] % 64
}
