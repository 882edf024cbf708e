// upscaler/src/core/processor.rs
use super::job::{EnhancedImage, ImageMime, SourceFile};
use super::{Engine, PreprocessingOptions, ProcessingConfig, Result, UpscaleError, UpscaleFactor};
use crate::processors::filters::{self, ColorAdjust, FIDELITY_CONTRAST};
use crate::processors::{Compressor, Loader, Resizer};
use crate::remote::{EnhancementRequest, EnhancementService};
use std::sync::Arc;

/// Runs one job's source through the configured engine and filters.
pub struct Enhancer {
    loader: Loader,
    service: Arc<dyn EnhancementService>,
}

impl Enhancer {
    pub fn new(service: Arc<dyn EnhancementService>) -> Self {
        Self {
            loader: Loader::new(),
            service,
        }
    }

    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    pub async fn enhance(&self, source: &SourceFile, config: &ProcessingConfig) -> Result<EnhancedImage> {
        let mime = source
            .image_mime()
            .ok_or_else(|| UpscaleError::UnsupportedFormat(source.mime_type.clone()))?;
        let data = self.loader.read(source).await?;

        match config.engine {
            Engine::Fidelity => {
                let loader = self.loader.clone();
                let factor = config.factor;
                let preprocessing = config.preprocessing;
                blocking(move || upscale_locally(&loader, &data, mime, factor, preprocessing)).await
            }
            Engine::Generative => self.enhance_remotely(data, mime, config).await,
        }
    }

    async fn enhance_remotely(
        &self,
        data: Arc<[u8]>,
        mime: ImageMime,
        config: &ProcessingConfig,
    ) -> Result<EnhancedImage> {
        let preprocessing = config.preprocessing;
        let image = if preprocessing.is_noop() {
            data
        } else {
            blocking(move || {
                filters::prefilter(&data, mime, preprocessing).map(|out| Arc::<[u8]>::from(out.as_ref()))
            })
            .await?
        };

        let request = EnhancementRequest {
            image,
            mime,
            factor: config.factor,
            goal: config.goal,
            tier: config.tier,
        };
        let enhanced = self.service.enhance(&request).await?;

        if !config.color_enhancement {
            return Ok(enhanced);
        }

        log::debug!("Applying colour enhancement to {} bytes", enhanced.byte_size());
        blocking(move || {
            let (data, width, height) = filters::color_enhance(&enhanced.data)?;
            Ok(EnhancedImage::new(data, ImageMime::Png, width, height))
        })
        .await
    }
}

/// Fidelity engine: pre-filter, resample by `factor`, counter the softness
/// with a mild contrast boost, re-encode in the source format.
pub fn upscale_locally(
    loader: &Loader,
    data: &[u8],
    mime: ImageMime,
    factor: UpscaleFactor,
    preprocessing: PreprocessingOptions,
) -> Result<EnhancedImage> {
    let image = loader.load_from_bytes(data)?;
    filters::ensure_surface(&image)?;
    let (width, height) = (image.width(), image.height());
    let image = filters::apply_prefilters(image, preprocessing);

    let upscaled = Resizer::high_quality().upscale(&image, factor)?;
    let boosted = filters::adjust_colors(&upscaled, ColorAdjust::contrast(FIDELITY_CONTRAST));
    let encoded = Compressor::default().encode(&boosted, mime)?;

    log::info!(
        "Fidelity upscale {}x{} -> {}x{} ({} bytes)",
        width,
        height,
        boosted.width(),
        boosted.height(),
        encoded.len()
    );

    Ok(EnhancedImage::new(encoded, mime, boosted.width(), boosted.height()))
}

/// Runs CPU-bound image work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| UpscaleError::ContextUnavailable(format!("image worker failed: {}", e)))?
}
