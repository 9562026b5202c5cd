use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::SourceImageError;

/// The user's photo for one request. Holds both the original encoded bytes
/// (sent to the provider unchanged) and the decoded pixels.
#[derive(Debug, Clone)]
pub struct SourceImage {
    bytes: Vec<u8>,
    mime_type: &'static str,
    image: DynamicImage,
}

impl SourceImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SourceImageError> {
        let format = image::guess_format(&bytes)?;
        let mime_type = match format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            other => return Err(SourceImageError::UnsupportedFormat(format!("{other:?}"))),
        };
        let image = image::load_from_memory_with_format(&bytes, format)?;
        Ok(Self {
            bytes,
            mime_type,
            image,
        })
    }

    pub fn open(path: &Path) -> Result<Self, SourceImageError> {
        let bytes = std::fs::read(path).map_err(|source| SourceImageError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode(width, height, color, ImageFormat::Png)
    }

    pub fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode(width, height, color, ImageFormat::Jpeg)
    }

    fn encode(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, format)
            .expect("in-memory encode");
        out.into_inner()
    }
}
