// upscaler/src/processors/compressor.rs
use super::resizer::Resizer;
use crate::core::job::ImageMime;
use crate::core::{ResizeAlgorithm, Result, UpscaleError};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat, RgbImage};
use oxipng::{optimize_from_memory, Options};
use std::borrow::Cow;
use std::io::Cursor;

/// JPEG quality used when re-encoding in the source format.
pub const DEFAULT_QUALITY: u8 = 92;

pub struct Compressor {
    quality: u8,
    optimize_png: bool,
}

impl Compressor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            optimize_png: false,
        }
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, image: &DynamicImage, mime: ImageMime) -> Result<Vec<u8>> {
        log::debug!(
            "Encoding {}x{} image as {} (quality {})",
            image.width(),
            image.height(),
            mime,
            self.quality
        );

        match mime {
            ImageMime::Jpeg => encode_jpeg(&image.to_rgb8(), self.quality),
            ImageMime::Png => {
                let data = write_format(&png_compatible(image), ImageFormat::Png)?;
                if self.optimize_png {
                    self.optimize_png_bytes(&data)
                } else {
                    Ok(data)
                }
            }
            ImageMime::WebP => {
                write_format(&DynamicImage::ImageRgba8(image.to_rgba8()), ImageFormat::WebP)
            }
        }
    }

    /// Maximum-quality download: optimized lossless PNG.
    pub fn lossless_export(image: &DynamicImage) -> Result<Vec<u8>> {
        Compressor::new(100)
            .with_png_optimization(true)
            .encode(image, ImageMime::Png)
    }

    fn optimize_png_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        optimize_from_memory(data, &Options::from_preset(2)).map_err(|e| {
            UpscaleError::ContextUnavailable(format!("PNG optimization failed: {}", e))
        })
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(rgb)?;
    Ok(buffer)
}

fn write_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format)?;
    Ok(buffer.into_inner())
}

fn png_compatible(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        _ => Cow::Borrowed(image),
    }
}

/// Quality reduction until an encoding fits a byte budget.
///
/// Qualities are percentages; the 0..1 scale value is `quality / 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSearch {
    pub start: u8,
    pub step: u8,
    pub floor: u8,
    pub budget_bytes: u64,
}

impl Default for BudgetSearch {
    fn default() -> Self {
        Self {
            start: 95,
            step: 5,
            floor: 70,
            budget_bytes: 40 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetOutcome {
    pub data: Vec<u8>,
    pub quality: u8,
    /// Every quality tried, in order.
    pub attempts: Vec<u8>,
}

impl BudgetOutcome {
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl BudgetSearch {
    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }

    /// Upper bound on encode attempts.
    pub fn max_attempts(&self) -> usize {
        if self.step == 0 {
            return 1;
        }
        let span = self.start.saturating_sub(self.floor) as usize;
        span.div_ceil(self.step as usize) + 1
    }

    pub fn search(&self, image: &DynamicImage) -> Result<BudgetOutcome> {
        let rgb = image.to_rgb8();
        self.search_with(|quality| encode_jpeg(&rgb, quality))
    }

    pub fn search_with<F>(&self, mut encode: F) -> Result<BudgetOutcome>
    where
        F: FnMut(u8) -> Result<Vec<u8>>,
    {
        if self.step == 0 || self.floor == 0 || self.start > 100 {
            return Err(UpscaleError::InvalidParameter(format!(
                "Invalid budget search {:?}",
                self
            )));
        }

        let mut quality = self.start.max(self.floor);
        let mut attempts = Vec::with_capacity(self.max_attempts());

        loop {
            let data = encode(quality)?;
            attempts.push(quality);
            let size = data.len() as u64;

            log::debug!(
                "Budget search: quality {} -> {} bytes (budget {})",
                quality,
                size,
                self.budget_bytes
            );

            if size <= self.budget_bytes || quality <= self.floor {
                if size > self.budget_bytes {
                    log::warn!(
                        "Encoding still {} bytes over budget at quality floor {}",
                        size - self.budget_bytes,
                        self.floor
                    );
                }
                return Ok(BudgetOutcome {
                    data,
                    quality,
                    attempts,
                });
            }

            quality = quality.saturating_sub(self.step).max(self.floor);
        }
    }
}

pub const PREVIEW_VIEWPORT: u32 = 300;
pub const PREVIEW_MAX_ZOOM: u32 = 4;

/// Center crop of `image` blown up with nearest-neighbour sampling so that
/// compression artifacts stay visible. The result fits in a `viewport`
/// square.
pub fn zoom_crop(image: &DynamicImage, viewport: u32, zoom: u32) -> DynamicImage {
    let zoom = zoom.max(1);
    let side = (viewport / zoom).max(1);
    let crop_w = side.min(image.width());
    let crop_h = side.min(image.height());
    let x = (image.width() - crop_w) / 2;
    let y = (image.height() - crop_h) / 2;

    let cropped = image.crop_imm(x, y, crop_w, crop_h);
    Resizer::new(ResizeAlgorithm::Nearest).resize_exact(&cropped, crop_w * zoom, crop_h * zoom)
}
