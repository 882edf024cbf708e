// upscaler/src/processors/loader.rs
use crate::core::job::SourceFile;
use crate::core::{Result, UpscaleError, MAX_DIMENSION, MAX_PIXELS};
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
    max_pixels: u64,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((MAX_DIMENSION, MAX_DIMENSION)),
            max_pixels: MAX_PIXELS,
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Reads the whole source file into memory.
    pub async fn read(&self, source: &SourceFile) -> Result<Arc<[u8]>> {
        log::debug!("Reading {} from {}", source.name, source.path.display());

        let data = tokio::fs::read(&source.path)
            .await
            .map_err(|e| UpscaleError::ReadFailure(format!("{}: {}", source.name, e)))?;

        if data.is_empty() {
            return Err(UpscaleError::ReadFailure(format!("{} is empty", source.name)));
        }

        Ok(data.into())
    }

    /// Decodes `data`, checking the header dimensions before any pixel
    /// buffer is allocated.
    pub fn load_from_bytes(&self, data: &[u8]) -> Result<DynamicImage> {
        let (width, height) = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| UpscaleError::DecodeFailure(e.to_string()))?
            .into_dimensions()
            .map_err(|e| UpscaleError::DecodeFailure(e.to_string()))?;
        self.check_surface(width, height)?;

        let image = image::load_from_memory(data)
            .map_err(|e| UpscaleError::DecodeFailure(e.to_string()))?;

        log::debug!(
            "Decoded image: {}x{} pixels, color: {:?}",
            width,
            height,
            image.color()
        );

        Ok(image)
    }

    fn check_surface(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(UpscaleError::ContextUnavailable(
                "image has no pixels".to_string(),
            ));
        }

        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(UpscaleError::ContextUnavailable(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_pixels {
            return Err(UpscaleError::ContextUnavailable(format!(
                "Image has {} pixels, more than the {} pixel limit",
                pixels, self.max_pixels
            )));
        }

        Ok(())
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
