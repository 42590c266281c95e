//! Error Taxonomy
//!
//! Per-format failures never cross the batch boundary: they are converted into
//! `ValidationResult` entries by the pipeline. Only job-level problems surface
//! as `EngineError` from the public entry points.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source image could not be turned into a sampling rectangle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CropError {
    #[error("Source image has empty dimensions ({0}x{1})")]
    EmptySource(u32, u32),

    #[error("Source image could not be decoded: {0}")]
    Decode(String),

    #[error("Invalid target size {0}x{1}")]
    InvalidTarget(u32, u32),
}

/// Text still exceeds the canvas after wrapping, clamping and the fit pass.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("Text block {block_height:.1}px tall exceeds available height {available_height:.1}px")]
#[serde(rename_all = "camelCase")]
pub struct LayoutOverflow {
    pub block_height: f32,
    pub available_height: f32,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Crop failed: {0}")]
    Crop(#[from] CropError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Format not found: {0}")]
    FormatNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
