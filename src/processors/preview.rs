// upscaler/src/processors/preview.rs
//! Debounced JPEG quality preview for a finished job.
//!
//! Each `set_quality` call supersedes the previous one: the pending
//! computation is aborted, and a computation that finishes after being
//! superseded never publishes its frame.

use super::compressor::{encode_jpeg, zoom_crop, PREVIEW_MAX_ZOOM, PREVIEW_VIEWPORT};
use super::loader::Loader;
use crate::core::processor::blocking;
use crate::core::Result;
use image::{DynamicImage, RgbImage};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const QUALITY_RANGE: RangeInclusive<u8> = 75..=100;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub quality: u8,
    /// Size of the full-resolution encoding at `quality`.
    pub byte_size: usize,
    pub zoomed: Arc<DynamicImage>,
}

pub struct QualityPreview {
    original: Arc<RgbImage>,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    busy: Arc<AtomicBool>,
    pending: Option<JoinHandle<()>>,
    frames: Arc<watch::Sender<Option<PreviewFrame>>>,
}

impl QualityPreview {
    pub fn new(image: &DynamicImage) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            original: Arc::new(image.to_rgb8()),
            debounce: DEFAULT_DEBOUNCE,
            generation: Arc::new(AtomicU64::new(0)),
            busy: Arc::new(AtomicBool::new(false)),
            pending: None,
            frames: Arc::new(frames),
        }
    }

    /// Decodes `data` off the async workers.
    pub async fn from_bytes(data: Arc<[u8]>) -> Result<Self> {
        let image = blocking(move || Loader::new().load_from_bytes(&data)).await?;
        Ok(Self::new(&image))
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.frames.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn clamp_quality(quality: u8) -> u8 {
        quality.clamp(*QUALITY_RANGE.start(), *QUALITY_RANGE.end())
    }

    /// Schedules a recompute at `quality` (clamped) and returns the value
    /// actually scheduled. Must be called inside a Tokio runtime.
    pub fn set_quality(&mut self, quality: u8) -> u8 {
        let quality = Self::clamp_quality(quality);
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = self.pending.take() {
            previous.abort();
        }

        let original = Arc::clone(&self.original);
        let generation = Arc::clone(&self.generation);
        let busy = Arc::clone(&self.busy);
        let frames = Arc::clone(&self.frames);
        let debounce = self.debounce;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if generation.load(Ordering::SeqCst) != ticket {
                return;
            }

            busy.store(true, Ordering::SeqCst);
            let rendered = blocking(move || render(&original, quality)).await;

            if generation.load(Ordering::SeqCst) != ticket {
                log::debug!("Dropping stale preview at quality {}", quality);
                return;
            }
            busy.store(false, Ordering::SeqCst);

            match rendered {
                Ok(frame) => {
                    log::debug!("Preview at quality {}: {} bytes", quality, frame.byte_size);
                    frames.send_replace(Some(frame));
                }
                Err(e) => log::warn!("Preview at quality {} failed: {}", quality, e),
            }
        }));

        quality
    }

    /// Full-resolution JPEG at `quality` (clamped), for download.
    pub async fn export(&self, quality: u8) -> Result<Vec<u8>> {
        let quality = Self::clamp_quality(quality);
        let original = Arc::clone(&self.original);
        blocking(move || encode_jpeg(&original, quality)).await
    }
}

impl Drop for QualityPreview {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

fn render(original: &RgbImage, quality: u8) -> Result<PreviewFrame> {
    let encoded = encode_jpeg(original, quality)?;
    let decoded = Loader::new().load_from_bytes(&encoded)?;
    Ok(PreviewFrame {
        quality,
        byte_size: encoded.len(),
        zoomed: Arc::new(zoom_crop(&decoded, PREVIEW_VIEWPORT, PREVIEW_MAX_ZOOM)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tokio::time::timeout;

    fn noisy(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (x * 31 + y * 17) ^ (x * y);
            Rgb([v as u8, (v >> 3) as u8, (v >> 5) as u8])
        }))
    }

    #[test]
    fn quality_is_clamped_to_slider_range() {
        assert_eq!(QualityPreview::clamp_quality(10), 75);
        assert_eq!(QualityPreview::clamp_quality(88), 88);
        assert_eq!(QualityPreview::clamp_quality(255), 100);
    }

    #[tokio::test]
    async fn latest_request_wins() {
        let mut preview = QualityPreview::new(&noisy(400, 300)).with_debounce(Duration::from_millis(20));
        let mut rx = preview.subscribe();

        preview.set_quality(80);
        preview.set_quality(95);

        timeout(Duration::from_secs(10), rx.changed()).await.unwrap().unwrap();
        let frame = rx.borrow_and_update().clone().unwrap();
        assert_eq!(frame.quality, 95);
        assert!(frame.byte_size > 0);
        assert_eq!((frame.zoomed.width(), frame.zoomed.height()), (300, 300));

        // The superseded request never shows up.
        assert!(timeout(Duration::from_millis(200), rx.changed()).await.is_err());
        assert!(!preview.is_busy());
    }

    #[tokio::test]
    async fn higher_quality_costs_more_bytes() {
        let mut preview = QualityPreview::new(&noisy(256, 256)).with_debounce(Duration::from_millis(1));
        let mut rx = preview.subscribe();

        preview.set_quality(75);
        timeout(Duration::from_secs(10), rx.changed()).await.unwrap().unwrap();
        let low = rx.borrow_and_update().clone().unwrap();

        preview.set_quality(100);
        timeout(Duration::from_secs(10), rx.changed()).await.unwrap().unwrap();
        let high = rx.borrow_and_update().clone().unwrap();

        assert!(high.byte_size > low.byte_size);
    }

    #[tokio::test]
    async fn dropping_the_preview_cancels_pending_work() {
        let mut preview = QualityPreview::new(&noisy(64, 64)).with_debounce(Duration::from_millis(50));
        let mut rx = preview.subscribe();
        preview.set_quality(90);
        drop(preview);

        let changed = timeout(Duration::from_secs(5), rx.changed()).await.unwrap();
        assert!(changed.is_err());
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn export_matches_previewed_size() {
        let mut preview = QualityPreview::from_bytes(
            crate::processors::Compressor::default()
                .encode(&noisy(120, 80), crate::core::job::ImageMime::Png)
                .unwrap()
                .into(),
        )
        .await
        .unwrap()
        .with_debounce(Duration::from_millis(1));
        let mut rx = preview.subscribe();

        preview.set_quality(85);
        timeout(Duration::from_secs(10), rx.changed()).await.unwrap().unwrap();
        let frame = rx.borrow_and_update().clone().unwrap();

        let exported = preview.export(85).await.unwrap();
        assert_eq!(exported.len(), frame.byte_size);
    }
}
