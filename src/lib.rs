//! BannerForge Core - Adaptive Creative Layout & Export Validation
//!
//! One source image, one brand kit and one piece of ad copy in; every
//! catalog format out, cropped, laid out, rendered (raster and HTML5),
//! validated against platform limits and packaged with a manifest.
//!
//! # Invariants
//! 1. Catalog Is Data: platform limits live in JSON, never in code
//! 2. One Geometry: raster and HTML5 read the same `LayoutGeometry`
//! 3. Validation Is Mandatory: every rendered format passes through `Validator`
//! 4. Failures Stay Local: one broken format never aborts the batch
//! 5. Deterministic Output: identical inputs give identical manifest hashes

pub mod brand;
pub mod catalog;
pub mod config;
pub mod crop;
pub mod draw;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod hashing;
pub mod html5;
pub mod layout;
pub mod overlay;
pub mod pipeline;
pub mod providers;
pub mod raster;
pub mod validation;

pub use brand::{Anchor, BrandKit, Color, LogoRules, LogoVariants};
pub use catalog::{FormatCatalog, FormatId, FormatSpec, SafeZone};
pub use config::EngineConfig;
pub use crop::{decode_image, resolve_crop, CropRect, DecodedImage, FocalPoint};
pub use draw::{build_draw_list, Canvas, DrawCommand};
pub use error::{CropError, EngineError, EngineResult, LayoutOverflow};
pub use export::{Deliverable, ExportManifest, ExportPackager, FailurePolicy};
pub use fonts::{FontLibrary, FontMeasurer};
pub use hashing::{canonical_json, compute_content_hash, compute_manifest_hash};
pub use html5::{Html5Artifact, Html5Composer, Html5Options};
pub use layout::{Band, LayoutGeometry, LayoutInput, TextLayoutEngine};
pub use overlay::{CropMode, CropSpec, FontSizeTier, FormatOverride, OverlayPosition, TextOverlaySpec};
pub use pipeline::{ExportJob, ExportPipeline, ExportReport, SourceImage};
pub use providers::{ImageGenerationProvider, SmartCropProvider};
pub use raster::{RasterArtifact, RasterComposer};
pub use validation::{ValidationResult, ValidationRule, ValidationSummary, ValidationViolation, Validator, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
