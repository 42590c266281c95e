//! Text overlay content, per-format overrides and crop session inputs

use serde::{Deserialize, Serialize};

use crate::brand::{Anchor, Color};

pub const MIN_FONT_MULTIPLIER: f32 = 0.5;
pub const MAX_FONT_MULTIPLIER: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSizeTier {
    Small,
    #[default]
    Medium,
    Large,
}

/// Base multipliers a tier applies to the band formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierMultipliers {
    pub headline: f32,
    pub subheadline: f32,
    pub cta: f32,
}

impl FontSizeTier {
    pub fn multipliers(&self) -> TierMultipliers {
        match self {
            FontSizeTier::Small => TierMultipliers { headline: 0.08, subheadline: 0.05, cta: 0.045 },
            FontSizeTier::Medium => TierMultipliers { headline: 0.10, subheadline: 0.06, cta: 0.05 },
            FontSizeTier::Large => TierMultipliers { headline: 0.13, subheadline: 0.075, cta: 0.055 },
        }
    }
}

/// Explicit percentage coordinates from a drag interaction, in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPosition {
    pub x_percent: f32,
    pub y_percent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverlayPosition {
    Anchor(Anchor),
    Custom(CustomPosition),
}

impl Default for OverlayPosition {
    fn default() -> Self {
        OverlayPosition::Anchor(Anchor::BottomCenter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowSpec {
    pub color: Color,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ShadowSpec {
    fn default() -> Self {
        Self {
            color: Color::BLACK.with_alpha(128),
            blur: 4.0,
            offset_x: 1.0,
            offset_y: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlaySpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub subheadline: String,
    #[serde(default)]
    pub cta: String,
    #[serde(default)]
    pub position: OverlayPosition,
    /// Falls back to the brand text color when absent.
    #[serde(default)]
    pub headline_color: Option<Color>,
    #[serde(default)]
    pub subheadline_color: Option<Color>,
    #[serde(default)]
    pub cta_color: Option<Color>,
    #[serde(default)]
    pub cta_text_color: Option<Color>,
    #[serde(default)]
    pub shadow: Option<ShadowSpec>,
    #[serde(default)]
    pub font_size_tier: FontSizeTier,
}

fn default_true() -> bool { true }

impl Default for TextOverlaySpec {
    fn default() -> Self {
        Self {
            enabled: true,
            headline: String::new(),
            subheadline: String::new(),
            cta: String::new(),
            position: OverlayPosition::default(),
            headline_color: None,
            subheadline_color: None,
            cta_color: None,
            cta_text_color: None,
            shadow: None,
            font_size_tier: FontSizeTier::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOverride {
    #[serde(default = "default_multiplier")]
    pub font_size_multiplier: f32,
    #[serde(default)]
    pub hide_headline: bool,
    #[serde(default)]
    pub hide_subheadline: bool,
    #[serde(default)]
    pub hide_cta: bool,
    #[serde(default)]
    pub custom_position: Option<OverlayPosition>,
}

fn default_multiplier() -> f32 { 1.0 }

impl Default for FormatOverride {
    fn default() -> Self {
        Self {
            font_size_multiplier: 1.0,
            hide_headline: false,
            hide_subheadline: false,
            hide_cta: false,
            custom_position: None,
        }
    }
}

impl FormatOverride {
    /// Multiplier forced into [0.5, 2.0]; NaN reads as 1.0.
    pub fn effective_multiplier(&self) -> f32 {
        if self.font_size_multiplier.is_nan() {
            return 1.0;
        }
        self.font_size_multiplier.clamp(MIN_FONT_MULTIPLIER, MAX_FONT_MULTIPLIER)
    }
}

/// Normalized pan within the zoomed sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropSpec {
    #[serde(default = "default_center")]
    pub crop_x: f64,
    #[serde(default = "default_center")]
    pub crop_y: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

fn default_center() -> f64 { 0.5 }
fn default_zoom() -> f64 { 1.0 }

impl Default for CropSpec {
    fn default() -> Self {
        Self { crop_x: 0.5, crop_y: 0.5, zoom: 1.0 }
    }
}

impl CropSpec {
    /// Pan clamped to [0, 1], zoom to >= 1.
    pub fn normalized(&self) -> Self {
        let unit = |v: f64| if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) };
        let zoom = if self.zoom.is_nan() || self.zoom < 1.0 {
            1.0
        } else {
            self.zoom
        };
        Self {
            crop_x: unit(self.crop_x),
            crop_y: unit(self.crop_y),
            zoom,
        }
    }
}

/// How the sampling pan is obtained for a format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum CropMode {
    Manual(CropSpec),
    /// Focal point from a smart-crop provider, at the given zoom.
    Smart {
        #[serde(default = "default_zoom")]
        zoom: f64,
    },
}

impl Default for CropMode {
    fn default() -> Self {
        CropMode::Manual(CropSpec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_is_clamped() {
        let mut o = FormatOverride { font_size_multiplier: 5.0, ..Default::default() };
        assert_eq!(o.effective_multiplier(), 2.0);
        o.font_size_multiplier = 0.1;
        assert_eq!(o.effective_multiplier(), 0.5);
        o.font_size_multiplier = f32::NAN;
        assert_eq!(o.effective_multiplier(), 1.0);
    }

    #[test]
    fn position_accepts_anchor_or_custom() {
        let a: OverlayPosition = serde_json::from_str(r#""top-left""#).unwrap();
        assert_eq!(a, OverlayPosition::Anchor(Anchor::TopLeft));
        let c: OverlayPosition = serde_json::from_str(r#"{"xPercent": 20, "yPercent": 80}"#).unwrap();
        assert_eq!(c, OverlayPosition::Custom(CustomPosition { x_percent: 20.0, y_percent: 80.0 }));
    }

    #[test]
    fn crop_mode_tagged_json() {
        let m: CropMode = serde_json::from_str(r#"{"mode": "manual", "cropX": 0.2, "cropY": 1, "zoom": 1.5}"#).unwrap();
        assert_eq!(m, CropMode::Manual(CropSpec { crop_x: 0.2, crop_y: 1.0, zoom: 1.5 }));
        let s: CropMode = serde_json::from_str(r#"{"mode": "smart"}"#).unwrap();
        assert_eq!(s, CropMode::Smart { zoom: 1.0 });
    }

    #[test]
    fn crop_spec_normalizes_out_of_range() {
        let spec = CropSpec { crop_x: -1.0, crop_y: 3.0, zoom: 0.2 }.normalized();
        assert_eq!(spec, CropSpec { crop_x: 0.0, crop_y: 1.0, zoom: 1.0 });
    }
}
