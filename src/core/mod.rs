// upscaler/src/core/mod.rs
pub mod job;
pub mod processor;

use std::fmt;
use thiserror::Error;

/// Largest side, in pixels, of any surface we are willing to allocate.
pub const MAX_DIMENSION: u32 = 100_000;

/// Largest total pixel count of any surface (16384 x 16384).
pub const MAX_PIXELS: u64 = 268_435_456;

/// Per-file intake ceiling.
pub const DEFAULT_SIZE_LIMIT_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAlgorithm {
    Nearest,
    Bicubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpscaleFactor {
    #[default]
    X2,
    X4,
    X8,
}

impl UpscaleFactor {
    pub const ALL: [UpscaleFactor; 3] = [UpscaleFactor::X2, UpscaleFactor::X4, UpscaleFactor::X8];

    pub fn value(self) -> u32 {
        match self {
            UpscaleFactor::X2 => 2,
            UpscaleFactor::X4 => 4,
            UpscaleFactor::X8 => 8,
        }
    }
}

impl TryFrom<u32> for UpscaleFactor {
    type Error = UpscaleError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            2 => Ok(UpscaleFactor::X2),
            4 => Ok(UpscaleFactor::X4),
            8 => Ok(UpscaleFactor::X8),
            other => Err(UpscaleError::InvalidParameter(format!(
                "Upscale factor must be 2, 4 or 8 (got {})",
                other
            ))),
        }
    }
}

impl fmt::Display for UpscaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Hosted generative model.
    #[default]
    Generative,
    /// Local resampling, no network.
    Fidelity,
}

/// Emphasis of the generative engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Goal {
    #[default]
    Balanced,
    Details,
    Smoothness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityTier {
    #[default]
    Standard,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreprocessingOptions {
    pub noise_reduction: bool,
    pub auto_contrast: bool,
}

impl PreprocessingOptions {
    pub fn is_noop(&self) -> bool {
        !self.noise_reduction && !self.auto_contrast
    }
}

/// Options chosen for one batch run. Captured by value when the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingConfig {
    pub factor: UpscaleFactor,
    pub engine: Engine,
    /// Only consulted by [`Engine::Generative`].
    pub goal: Goal,
    /// Only consulted by [`Engine::Generative`].
    pub tier: QualityTier,
    pub preprocessing: PreprocessingOptions,
    /// Colour post-filter, applied to generative output only.
    pub color_enhancement: bool,
}

impl ProcessingConfig {
    pub fn fidelity(factor: UpscaleFactor) -> Self {
        Self {
            factor,
            engine: Engine::Fidelity,
            ..Default::default()
        }
    }

    pub fn generative(factor: UpscaleFactor, goal: Goal, tier: QualityTier) -> Self {
        Self {
            factor,
            engine: Engine::Generative,
            goal,
            tier,
            ..Default::default()
        }
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessingOptions) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn with_color_enhancement(mut self, enabled: bool) -> Self {
        self.color_enhancement = enabled;
        self
    }
}

#[derive(Error, Debug)]
pub enum UpscaleError {
    #[error("File is too large. Please upload an image under {limit_mb}MB.")]
    OversizedFile { size: u64, limit_mb: u64 },

    #[error("Could not process image. Please try another file. ({0})")]
    DecodeFailure(String),

    #[error("Could not obtain a drawing surface: {0}")]
    ContextUnavailable(String),

    #[error("No upscaled image was returned from the AI. The model may have refused the request.")]
    NoImageReturned,

    #[error("Failed to upscale image. The AI service may be temporarily unavailable or the image format is not supported.")]
    ServiceUnavailable { detail: String },

    #[error("Failed to read the image file: {0}")]
    ReadFailure(String),

    #[error("A batch is already running")]
    BatchInProgress,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl UpscaleError {
    pub fn service(detail: impl fmt::Display) -> Self {
        UpscaleError::ServiceUnavailable {
            detail: detail.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UpscaleError::OversizedFile { limit_mb, .. } => ErrorKind::FileTooLarge {
                limit_mb: *limit_mb,
            },
            UpscaleError::DecodeFailure(_)
            | UpscaleError::ContextUnavailable(_)
            | UpscaleError::UnsupportedFormat(_)
            | UpscaleError::Image(_) => ErrorKind::ProcessImage,
            UpscaleError::ReadFailure(_) | UpscaleError::Io(_) => ErrorKind::ReadFile,
            UpscaleError::NoImageReturned => ErrorKind::NoImageReturned,
            UpscaleError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            UpscaleError::BatchInProgress
            | UpscaleError::InvalidParameter(_)
            | UpscaleError::Config(_) => ErrorKind::Unknown,
        }
    }
}

/// What went wrong, in the terms shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileTooLarge { limit_mb: u64 },
    ProcessImage,
    ReadFile,
    NoImageReturned,
    ServiceUnavailable,
    Unknown,
}

pub type Result<T> = std::result::Result<T, UpscaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_round_trips_through_u32() {
        for factor in UpscaleFactor::ALL {
            assert_eq!(UpscaleFactor::try_from(factor.value()).unwrap(), factor);
        }
        assert!(UpscaleFactor::try_from(3).is_err());
    }

    #[test]
    fn oversized_message_names_the_limit() {
        let err = UpscaleError::OversizedFile {
            size: 10 * 1024 * 1024,
            limit_mb: 5,
        };
        assert!(err.to_string().contains("under 5MB"));
    }

    #[test]
    fn errors_map_to_user_facing_kinds() {
        let oversized = UpscaleError::OversizedFile {
            size: 1,
            limit_mb: 5,
        };
        assert_eq!(oversized.kind(), ErrorKind::FileTooLarge { limit_mb: 5 });
        assert_eq!(
            UpscaleError::DecodeFailure("bad header".into()).kind(),
            ErrorKind::ProcessImage
        );
        assert_eq!(
            UpscaleError::ContextUnavailable("too big".into()).kind(),
            ErrorKind::ProcessImage
        );
        assert_eq!(UpscaleError::ReadFailure("gone".into()).kind(), ErrorKind::ReadFile);
        assert_eq!(UpscaleError::NoImageReturned.kind(), ErrorKind::NoImageReturned);
        assert_eq!(UpscaleError::service("reset").kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(UpscaleError::Config("x".into()).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn service_error_hides_transport_detail() {
        let err = UpscaleError::service("connection reset by peer");
        assert!(!err.to_string().contains("connection reset"));
        assert!(err.to_string().contains("temporarily unavailable"));
    }
}
