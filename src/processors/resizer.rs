// upscaler/src/processors/resizer.rs
use crate::core::{ResizeAlgorithm, Result, UpscaleError, UpscaleFactor, MAX_DIMENSION, MAX_PIXELS};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

pub struct Resizer {
    algorithm: ResizeAlgorithm,
}

impl Resizer {
    pub fn new(algorithm: ResizeAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Resampler used by the fidelity engine.
    pub fn high_quality() -> Self {
        Self::new(ResizeAlgorithm::Bicubic)
    }

    /// Multiplies both sides by `factor`.
    pub fn upscale(&self, image: &DynamicImage, factor: UpscaleFactor) -> Result<DynamicImage> {
        let (width, height) = Self::target_dimensions(image.dimensions(), factor)?;

        log::debug!(
            "Upscaling image from {}x{} to {}x{} ({:?})",
            image.width(),
            image.height(),
            width,
            height,
            self.algorithm
        );

        Ok(self.resize_exact(image, width, height))
    }

    pub fn resize_exact(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if width == image.width() && height == image.height() {
            log::debug!("Image dimensions unchanged, skipping resize");
            return image.clone();
        }

        image.resize_exact(width, height, self.get_filter_type())
    }

    /// Side lengths after scaling by `factor`, refused when either side or
    /// the total area is beyond what we can allocate.
    pub fn target_dimensions((width, height): (u32, u32), factor: UpscaleFactor) -> Result<(u32, u32)> {
        let scale = factor.value();
        let target = width
            .checked_mul(scale)
            .zip(height.checked_mul(scale))
            .filter(|&(w, h)| w <= MAX_DIMENSION && h <= MAX_DIMENSION)
            .filter(|&(w, h)| u64::from(w) * u64::from(h) <= MAX_PIXELS);

        target.ok_or_else(|| {
            UpscaleError::ContextUnavailable(format!(
                "{}x{} at {}x exceeds the surface limit ({} px per side, {} px total)",
                width, height, scale, MAX_DIMENSION, MAX_PIXELS
            ))
        })
    }

    fn get_filter_type(&self) -> FilterType {
        match self.algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
        }
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::high_quality()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upscale_multiplies_both_sides() {
        let image = DynamicImage::new_rgb8(7, 5);
        let resizer = Resizer::high_quality();
        for factor in UpscaleFactor::ALL {
            let out = resizer.upscale(&image, factor).unwrap();
            assert_eq!(out.dimensions(), (7 * factor.value(), 5 * factor.value()));
        }
    }

    #[test]
    fn target_dimensions_respect_the_surface_limit() {
        assert_eq!(
            Resizer::target_dimensions((2000, 1500), UpscaleFactor::X4).unwrap(),
            (8000, 6000)
        );
        let err = Resizer::target_dimensions((20_000, 10), UpscaleFactor::X8).unwrap_err();
        assert!(matches!(err, UpscaleError::ContextUnavailable(_)));
    }

    #[test]
    fn target_dimensions_respect_the_area_limit() {
        // Both sides fit, the area does not.
        let err = Resizer::target_dimensions((12_000, 9_000), UpscaleFactor::X8).unwrap_err();
        assert!(matches!(err, UpscaleError::ContextUnavailable(_)));

        assert_eq!(
            Resizer::target_dimensions((8192, 8192), UpscaleFactor::X2).unwrap(),
            (16_384, 16_384)
        );
        assert!(Resizer::target_dimensions((8192, 8193), UpscaleFactor::X2).is_err());
    }

    #[test]
    fn nearest_keeps_hard_edges() {
        let mut image = image::RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        image.put_pixel(1, 0, image::Rgb([0, 0, 255]));
        let out = Resizer::new(ResizeAlgorithm::Nearest)
            .resize_exact(&DynamicImage::ImageRgb8(image), 8, 4)
            .to_rgb8();
        assert_eq!(out.get_pixel(3, 2), &image::Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(4, 2), &image::Rgb([0, 0, 255]));
    }
}
