// upscaler/src/lib.rs
pub mod cli;
pub mod core;
pub mod i18n;
pub mod processors;
pub mod remote;
pub mod utils;

pub use core::job::{
    EnhancedImage, ImageMime, JobFailure, JobId, JobSnapshot, JobState, JobStatus, SourceFile,
};
pub use core::processor::Enhancer;
pub use core::{
    Engine, ErrorKind, Goal, PreprocessingOptions, ProcessingConfig, QualityTier, Result, UpscaleError,
    UpscaleFactor,
};
pub use i18n::{Catalog, Locale, LocaleStore};
pub use processors::{BatchSummary, IntakeNotice, JobEvent, JobQueue, QualityPreview};
pub use remote::{EnhancementRequest, EnhancementService, GeminiClient, GeminiConfig};

pub mod prelude {
    pub use crate::{
        Enhancer, EnhancementService, JobQueue, ProcessingConfig, SourceFile, UpscaleFactor,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
