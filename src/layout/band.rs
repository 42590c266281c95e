//! Aspect-ratio bands and the font sizing formula each one selects.

use serde::{Deserialize, Serialize};

use crate::geometry::Size;
use crate::overlay::FontSizeTier;

pub const HEADLINE_MIN: f32 = 10.0;
pub const HEADLINE_MAX: f32 = 56.0;
pub const SUBHEADLINE_MIN: f32 = 8.0;
pub const SUBHEADLINE_MAX: f32 = 32.0;
pub const CTA_MIN: f32 = 8.0;
pub const CTA_MAX: f32 = 24.0;

/// Below this size the CTA is hidden rather than drawn.
pub const VISIBILITY_FLOOR: f32 = 8.0;

const VERY_SMALL_MIN_SIDE: u32 = 60;
const VERY_SMALL_MAX_SIDE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    VerySmall,
    Wide,
    SemiWide,
    Tall,
    SemiTall,
    Normal,
}

impl Band {
    pub fn classify(size: Size) -> Band {
        let min_side = size.width.min(size.height);
        let max_side = size.width.max(size.height);
        if min_side <= VERY_SMALL_MIN_SIDE || max_side <= VERY_SMALL_MAX_SIDE {
            return Band::VerySmall;
        }
        let r = size.aspect();
        if r > 3.0 {
            Band::Wide
        } else if r > 2.0 {
            Band::SemiWide
        } else if r < 0.6 {
            Band::Tall
        } else if r < 0.8 {
            Band::SemiTall
        } else {
            Band::Normal
        }
    }

    pub fn suppresses_subheadline(&self) -> bool {
        matches!(self, Band::VerySmall | Band::Wide | Band::SemiWide)
    }

    /// verySmall canvases collapse to one headline/CTA row.
    pub fn is_single_row(&self) -> bool {
        matches!(self, Band::VerySmall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    pub headline: f32,
    pub subheadline: f32,
    pub cta: f32,
}

impl FontSizes {
    /// Scale every size, never dropping below the per-element floor.
    pub fn scaled(&self, factor: f32) -> FontSizes {
        FontSizes {
            headline: (self.headline * factor).max(HEADLINE_MIN),
            subheadline: (self.subheadline * factor).max(SUBHEADLINE_MIN),
            cta: (self.cta * factor).max(CTA_MIN),
        }
    }

    pub fn at_floor(&self) -> bool {
        self.headline <= HEADLINE_MIN && self.subheadline <= SUBHEADLINE_MIN && self.cta <= CTA_MIN
    }
}

/// Unclamped sizes straight from the band formula.
pub fn base_sizes(band: Band, size: Size, tier: FontSizeTier) -> FontSizes {
    let m = tier.multipliers();
    let (w, h) = (size.width as f32, size.height as f32);
    match band {
        Band::Normal => {
            let base = size.min_side();
            FontSizes {
                headline: base * m.headline,
                subheadline: base * m.subheadline,
                cta: base * m.cta,
            }
        }
        Band::Wide => FontSizes {
            headline: h * m.headline * 3.2,
            subheadline: h * m.subheadline * 2.6,
            cta: h * m.cta * 2.8,
        },
        Band::SemiWide => FontSizes {
            headline: h * m.headline * 2.0,
            subheadline: h * m.subheadline * 1.8,
            cta: h * m.cta * 1.8,
        },
        Band::Tall => FontSizes {
            headline: w * m.headline * 1.4,
            subheadline: w * m.subheadline * 1.3,
            cta: w * m.cta * 1.4,
        },
        Band::SemiTall => FontSizes {
            headline: w * m.headline * 1.2,
            subheadline: w * m.subheadline * 1.15,
            cta: w * m.cta * 1.2,
        },
        Band::VerySmall => {
            let tier_scale = m.headline / FontSizeTier::Medium.multipliers().headline;
            let headline = (size.min_side() * 0.42).min(size.max_side() * 0.12) * tier_scale;
            FontSizes {
                headline,
                subheadline: headline * 0.6,
                cta: headline * 0.7,
            }
        }
    }
}

/// Apply the per-format multiplier, then the legibility clamps.
pub fn clamp_sizes(sizes: FontSizes, multiplier: f32) -> FontSizes {
    let clamp = |v: f32, lo: f32, hi: f32| {
        let v = v * multiplier;
        if v.is_finite() {
            v.clamp(lo, hi)
        } else {
            lo
        }
    };
    FontSizes {
        headline: clamp(sizes.headline, HEADLINE_MIN, HEADLINE_MAX),
        subheadline: clamp(sizes.subheadline, SUBHEADLINE_MIN, SUBHEADLINE_MAX),
        cta: clamp(sizes.cta, CTA_MIN, CTA_MAX),
    }
}
