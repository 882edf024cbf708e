// upscaler/src/processors/filters.rs
//! Deterministic pixel filters applied around the engines.
//!
//! Colour adjustments follow the CSS filter-function definitions (each
//! function clamps to the displayable range before the next one runs) and
//! are fused into a single parallel pass over RGBA pixels. Alpha is never
//! touched.

use super::compressor::Compressor;
use super::loader::Loader;
use crate::core::job::ImageMime;
use crate::core::{PreprocessingOptions, Result, UpscaleError};
use image::DynamicImage;
use rayon::prelude::*;
use std::borrow::Cow;

/// Gaussian sigma used by the noise-reduction pre-filter.
pub const NOISE_REDUCTION_SIGMA: f32 = 0.5;

/// Contrast multiplier used by the auto-contrast pre-filter.
pub const AUTO_CONTRAST: f32 = 1.15;

/// Contrast boost applied after local resampling.
pub const FIDELITY_CONTRAST: f32 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjust {
    pub saturation: f32,
    pub contrast: f32,
    pub brightness: f32,
}

impl ColorAdjust {
    pub const IDENTITY: ColorAdjust = ColorAdjust {
        saturation: 1.0,
        contrast: 1.0,
        brightness: 1.0,
    };

    /// Post-filter for generative output.
    pub const VIBRANCE: ColorAdjust = ColorAdjust {
        saturation: 1.25,
        contrast: 1.1,
        brightness: 1.05,
    };

    pub fn contrast(contrast: f32) -> Self {
        Self {
            contrast,
            ..Self::IDENTITY
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Applies saturate, then contrast, then brightness to one RGB triple
    /// in the 0..=1 range.
    fn apply_rgb(&self, rgb: [f32; 3]) -> [f32; 3] {
        let s = self.saturation;
        let [r, g, b] = rgb;
        let saturated = [
            (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
        ];

        saturated.map(|v| {
            let v = v.clamp(0.0, 1.0);
            let v = ((v - 0.5) * self.contrast + 0.5).clamp(0.0, 1.0);
            (v * self.brightness).clamp(0.0, 1.0)
        })
    }
}

/// Returns an adjusted copy; `image` is left untouched.
pub fn adjust_colors(image: &DynamicImage, adjust: ColorAdjust) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    if adjust.is_identity() {
        return DynamicImage::ImageRgba8(rgba);
    }

    let pixels: &mut [u8] = &mut rgba;
    pixels.par_chunks_mut(4).for_each(|px| {
        let rgb = [px[0], px[1], px[2]].map(|c| c as f32 / 255.0);
        let out = adjust.apply_rgb(rgb);
        for (channel, value) in px.iter_mut().zip(out) {
            *channel = (value * 255.0).round() as u8;
        }
    });

    DynamicImage::ImageRgba8(rgba)
}

pub fn blur(image: &DynamicImage, sigma: f32) -> DynamicImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let rgba = image.to_rgba8();
    DynamicImage::ImageRgba8(imageproc::filter::gaussian_blur_f32(&rgba, sigma))
}

/// Applies the enabled pre-filters, blur before contrast.
///
/// With nothing enabled the input bytes are handed back as-is, skipping the
/// decode/encode round trip.
pub fn prefilter<'a>(
    data: &'a [u8],
    mime: ImageMime,
    options: PreprocessingOptions,
) -> Result<Cow<'a, [u8]>> {
    if options.is_noop() {
        return Ok(Cow::Borrowed(data));
    }

    let image = Loader::new().load_from_bytes(data)?;
    let filtered = apply_prefilters(image, options);

    Compressor::default().encode(&filtered, mime).map(Cow::Owned)
}

/// Noise reduction then auto contrast, on an already decoded image.
pub fn apply_prefilters(mut image: DynamicImage, options: PreprocessingOptions) -> DynamicImage {
    if options.noise_reduction {
        log::debug!("Pre-filter: blur sigma {}", NOISE_REDUCTION_SIGMA);
        image = blur(&image, NOISE_REDUCTION_SIGMA);
    }
    if options.auto_contrast {
        log::debug!("Pre-filter: contrast x{}", AUTO_CONTRAST);
        image = adjust_colors(&image, ColorAdjust::contrast(AUTO_CONTRAST));
    }
    image
}

/// Vibrance post-filter for generative output. Always re-encodes as PNG.
pub fn color_enhance(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = Loader::new().load_from_bytes(data)?;
    let enhanced = adjust_colors(&image, ColorAdjust::VIBRANCE);
    let encoded = Compressor::default().encode(&enhanced, ImageMime::Png)?;
    Ok((encoded, enhanced.width(), enhanced.height()))
}

pub(crate) fn ensure_surface(image: &DynamicImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(UpscaleError::ContextUnavailable(
            "empty drawing surface".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(color)))
    }

    fn png(image: &DynamicImage) -> Vec<u8> {
        Compressor::default().encode(image, ImageMime::Png).unwrap()
    }

    #[test]
    fn identity_adjust_preserves_pixels() {
        let image = solid([10, 120, 240, 255]);
        let out = adjust_colors(&image, ColorAdjust::IDENTITY);
        assert_eq!(out.to_rgba8().get_pixel(0, 0), &Rgba([10, 120, 240, 255]));
    }

    #[test]
    fn contrast_pushes_away_from_mid_grey() {
        let image = solid([64, 128, 192, 200]);
        let px = *adjust_colors(&image, ColorAdjust::contrast(1.5))
            .to_rgba8()
            .get_pixel(1, 1);
        assert!(px[0] < 64);
        assert!(px[2] > 192);
        assert_eq!(px[3], 200);
    }

    #[test]
    fn saturation_leaves_greys_alone() {
        let image = solid([100, 100, 100, 255]);
        let adjust = ColorAdjust {
            saturation: 2.0,
            ..ColorAdjust::IDENTITY
        };
        let px = *adjust_colors(&image, adjust).to_rgba8().get_pixel(0, 0);
        assert_eq!(px, Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn vibrance_brightens_and_saturates() {
        let image = solid([150, 100, 80, 255]);
        let px = *adjust_colors(&image, ColorAdjust::VIBRANCE)
            .to_rgba8()
            .get_pixel(0, 0);
        assert!(px[0] > 150);
        assert!(px[0] as i32 - px[2] as i32 > 70);
    }

    #[test]
    fn adjust_does_not_mutate_input() {
        let image = solid([150, 100, 80, 255]);
        let before = image.clone();
        let _ = adjust_colors(&image, ColorAdjust::VIBRANCE);
        assert_eq!(image, before);
    }

    #[test]
    fn prefilter_without_options_borrows_input() {
        let data = png(&solid([1, 2, 3, 255]));
        let out = prefilter(&data, ImageMime::Png, PreprocessingOptions::default()).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, data.as_slice());
    }

    #[test]
    fn prefilter_reencodes_in_source_format() {
        let data = png(&solid([90, 100, 110, 255]));
        let options = PreprocessingOptions {
            noise_reduction: true,
            auto_contrast: true,
        };
        let out = prefilter(&data, ImageMime::Png, options).unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        assert_eq!(ImageMime::sniff(&out), Some(ImageMime::Png));
        let decoded = Loader::new().load_from_bytes(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn prefilter_on_garbage_is_a_decode_failure() {
        let options = PreprocessingOptions {
            noise_reduction: true,
            auto_contrast: false,
        };
        let err = prefilter(b"nope", ImageMime::Png, options).unwrap_err();
        assert!(matches!(err, UpscaleError::DecodeFailure(_)));
    }

    #[test]
    fn color_enhance_outputs_png_of_same_size() {
        let data = png(&solid([150, 100, 80, 255]));
        let (out, w, h) = color_enhance(&data).unwrap();
        assert_eq!((w, h), (4, 4));
        assert_eq!(ImageMime::sniff(&out), Some(ImageMime::Png));
    }
}
