// upscaler/src/remote/mod.rs
//! Boundary to the hosted generative enhancement service.

pub mod gemini;
pub mod prompt;

use crate::core::job::{EnhancedImage, ImageMime};
use crate::core::{Goal, QualityTier, Result, UpscaleFactor};
use async_trait::async_trait;
use std::sync::Arc;

pub use gemini::{GeminiClient, GeminiConfig};

#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    pub image: Arc<[u8]>,
    pub mime: ImageMime,
    pub factor: UpscaleFactor,
    pub goal: Goal,
    pub tier: QualityTier,
}

impl EnhancementRequest {
    pub fn instruction(&self) -> String {
        prompt::build_instruction(self.tier, self.factor, self.goal)
    }
}

/// One attempt per call; retrying is the caller's business.
#[async_trait]
pub trait EnhancementService: Send + Sync {
    async fn enhance(&self, request: &EnhancementRequest) -> Result<EnhancedImage>;
}

/// Stand-in used when no credential is configured. Every call fails.
#[derive(Debug, Default)]
pub struct Unconfigured;

#[async_trait]
impl EnhancementService for Unconfigured {
    async fn enhance(&self, _request: &EnhancementRequest) -> Result<EnhancedImage> {
        Err(crate::core::UpscaleError::Config(
            "API_KEY environment variable not set.".to_string(),
        ))
    }
}
