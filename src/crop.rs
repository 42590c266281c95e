//! Crop Resolver - cover-fit sampling rectangles
//!
//! The sampled rectangle always has the target aspect ratio and, for
//! `zoom >= 1`, stays inside the source. Pan (or an external focal point)
//! distributes the remaining slack.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CropError;
use crate::geometry::Size;
use crate::overlay::CropSpec;

/// Focal point from a smart-crop detector, both coordinates in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocalPoint {
    pub focus_x: f64,
    pub focus_y: f64,
}

impl FocalPoint {
    pub const CENTER: FocalPoint = FocalPoint { focus_x: 0.5, focus_y: 0.5 };

    /// Use the focal point in place of the manual pan.
    pub fn as_crop(&self, zoom: f64) -> CropSpec {
        CropSpec {
            crop_x: self.focus_x,
            crop_y: self.focus_y,
            zoom,
        }
        .normalized()
    }
}

/// A decoded source image, shared read-only between formats.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: Arc<DynamicImage>,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image: Arc::new(image) }
    }

    pub fn size(&self) -> Size {
        let (w, h) = self.image.dimensions();
        Size::new(w, h)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decode encoded bytes. The only suspension point before cropping.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, CropError> {
    if bytes.is_empty() {
        return Err(CropError::Decode("empty input".to_string()));
    }
    let image = image::load_from_memory(bytes).map_err(|e| CropError::Decode(e.to_string()))?;
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(CropError::EmptySource(w, h));
    }
    Ok(DecodedImage::new(image))
}

/// Sampling rectangle in source pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub src_x: f64,
    pub src_y: f64,
    pub sampled_w: f64,
    pub sampled_h: f64,
}

impl CropRect {
    /// Integer bounds `(x, y, w, h)` for sampling, at least 1px and kept
    /// inside a source of the given size.
    pub fn to_pixel_bounds(&self, source: Size) -> (u32, u32, u32, u32) {
        let w = (self.sampled_w.round() as u32).clamp(1, source.width);
        let h = (self.sampled_h.round() as u32).clamp(1, source.height);
        let x = (self.src_x.round().max(0.0) as u32).min(source.width - w);
        let y = (self.src_y.round().max(0.0) as u32).min(source.height - h);
        (x, y, w, h)
    }
}

pub fn resolve_crop(source: Size, target: Size, spec: &CropSpec) -> Result<CropRect, CropError> {
    if source.width == 0 || source.height == 0 {
        return Err(CropError::EmptySource(source.width, source.height));
    }
    if target.width == 0 || target.height == 0 {
        return Err(CropError::InvalidTarget(target.width, target.height));
    }

    let spec = spec.normalized();
    let (sw, sh) = (source.width as f64, source.height as f64);
    let target_aspect = target.width as f64 / target.height as f64;

    let (sampled_w, sampled_h) = if sw / sh > target_aspect {
        let sampled_h = sh / spec.zoom;
        (sampled_h * target_aspect, sampled_h)
    } else {
        let sampled_w = sw / spec.zoom;
        (sampled_w, sampled_w / target_aspect)
    };

    Ok(CropRect {
        src_x: (sw - sampled_w) * spec.crop_x,
        src_y: (sh - sampled_h) * spec.crop_y,
        sampled_w,
        sampled_h,
    })
}

/// Sample the crop rectangle and scale it to fill the whole target canvas.
pub fn sample_cover(source: &DecodedImage, target: Size, spec: &CropSpec) -> Result<RgbaImage, CropError> {
    let rect = resolve_crop(source.size(), target, spec)?;
    let (x, y, w, h) = rect.to_pixel_bounds(source.size());
    let cropped = source.image().crop_imm(x, y, w, h);
    Ok(cropped
        .resize_exact(target.width, target.height, FilterType::CatmullRom)
        .to_rgba8())
}
