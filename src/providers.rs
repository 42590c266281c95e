//! External provider contracts
//!
//! Smart crop and image generation run outside the engine. The pipeline only
//! sees these two traits.

use crate::crop::{DecodedImage, FocalPoint};
use crate::error::{EngineError, EngineResult};
use crate::geometry::Size;

/// Suggests the point of interest to keep when cropping for `target`.
pub trait SmartCropProvider: Send + Sync {
    fn detect_focus(&self, image: &DecodedImage, target: Size) -> EngineResult<FocalPoint>;
}

/// Produces an encoded image (PNG/JPEG bytes) for a prompt.
pub trait ImageGenerationProvider: Send + Sync {
    fn generate(&self, prompt: &str, width: u32, height: u32) -> EngineResult<Vec<u8>>;
}

/// Always answers the image center.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterFocus;

impl SmartCropProvider for CenterFocus {
    fn detect_focus(&self, _image: &DecodedImage, _target: Size) -> EngineResult<FocalPoint> {
        Ok(FocalPoint::CENTER)
    }
}

pub(crate) fn missing(kind: &str) -> EngineError {
    EngineError::Provider(format!("no {} provider configured", kind))
}
