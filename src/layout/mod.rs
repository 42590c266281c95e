//! Text Layout Engine
//!
//! Produces one canonical `LayoutGeometry` per format. The raster and HTML5
//! backends both read it unchanged, which keeps their output in agreement.

pub mod band;
pub mod measure;
pub mod wrap;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::brand::{Anchor, BrandKit, Color, HAlign, LogoRules, VAlign};
use crate::error::LayoutOverflow;
use crate::geometry::{Rect, Size};
use crate::overlay::{FormatOverride, OverlayPosition, ShadowSpec, TextOverlaySpec};

pub use band::{Band, FontSizes, VISIBILITY_FLOOR};
pub use measure::{FontWeight, HeuristicMeasurer, TextMeasurer};
pub use wrap::{truncate_to_width, wrap_text};

const LINE_HEIGHT: f32 = 1.2;
const ELEMENT_GAP: f32 = 0.3;
const CTA_GAP: f32 = 0.6;
const CTA_PAD_X: f32 = 1.2;
const CTA_HEIGHT: f32 = 2.0;
const CTA_MAX_RADIUS: f32 = 6.0;
const ASCENT: f32 = 0.8;
const FIT_STEP: f32 = 0.9;
const MAX_FIT_STEPS: usize = 12;
const WIDTH_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    pub text: String,
    /// Left edge of the line box.
    pub x: f32,
    /// Top of the line box.
    pub y: f32,
    pub width: f32,
    pub baseline: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub visible: bool,
    pub font_size: f32,
    pub line_height: f32,
    pub weight: FontWeight,
    pub color: Color,
    pub lines: Vec<TextLine>,
}

impl TextElement {
    fn hidden(font_size: f32, weight: FontWeight, color: Color) -> Self {
        Self {
            visible: false,
            font_size,
            line_height: font_size * LINE_HEIGHT,
            weight,
            color,
            lines: Vec::new(),
        }
    }

    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaElement {
    pub visible: bool,
    pub text: String,
    pub font_size: f32,
    pub text_width: f32,
    pub button: Rect,
    pub radius: f32,
    pub fill: Color,
    pub text_color: Color,
    pub text_x: f32,
    pub baseline: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoPlacement {
    pub anchor: Anchor,
    pub rect: Rect,
    pub opacity: f32,
}

/// Canonical layout output shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutGeometry {
    pub width: u32,
    pub height: u32,
    pub band: Band,
    pub padding: f32,
    pub align: HAlign,
    pub vertical: VAlign,
    /// x the lines align to: left edge, center or right edge of the block.
    pub anchor_x: f32,
    pub block: Rect,
    pub single_row: bool,
    pub font_family: String,
    pub shadow: Option<ShadowSpec>,
    pub headline: TextElement,
    pub subheadline: TextElement,
    pub cta: CtaElement,
    pub logo: Option<LogoPlacement>,
    pub overflow: Option<LayoutOverflow>,
    pub notes: Vec<String>,
}

impl LayoutGeometry {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn has_text(&self) -> bool {
        self.headline.visible || self.subheadline.visible || self.cta.visible
    }
}

/// Everything the engine reads for one format.
#[derive(Debug, Clone, Copy)]
pub struct LayoutInput<'a> {
    pub size: Size,
    pub overlay: &'a TextOverlaySpec,
    pub format_override: Option<&'a FormatOverride>,
    pub brand: &'a BrandKit,
    /// Width/height ratio of the logo to place, `None` when no logo is drawn.
    pub logo_aspect: Option<f32>,
}

pub fn padding_for(size: Size) -> f32 {
    (size.min_side() * 0.05).max(8.0)
}

pub fn place_logo(size: Size, rules: &LogoRules, aspect: f32) -> LogoPlacement {
    let side = rules.size_percent.clamp(1.0, 100.0) / 100.0 * size.min_side();
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    let (lw, lh) = if aspect >= 1.0 {
        (side, side / aspect)
    } else {
        (side * aspect, side)
    };
    let pad = rules.padding_px.max(0.0);
    let (w, h) = (size.width as f32, size.height as f32);

    let x = match rules.position.horizontal() {
        HAlign::Left => pad,
        HAlign::Center => (w - lw) / 2.0,
        HAlign::Right => w - pad - lw,
    };
    let y = match rules.position.vertical() {
        VAlign::Top => pad,
        VAlign::Center => (h - lh) / 2.0,
        VAlign::Bottom => h - pad - lh,
    };

    LogoPlacement {
        anchor: rules.position,
        rect: Rect::new(x, y, lw, lh),
        opacity: (rules.opacity_percent / 100.0).clamp(0.0, 1.0),
    }
}

#[derive(Debug, Clone, Copy)]
struct Visibility {
    headline: bool,
    subheadline: bool,
    cta: bool,
}

#[derive(Debug, Clone)]
struct CtaBox {
    font_size: f32,
    text_width: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Clone)]
struct Stack {
    sizes: FontSizes,
    headline: Vec<(String, f32)>,
    subheadline: Vec<(String, f32)>,
    cta: Option<CtaBox>,
    width: f32,
    height: f32,
}

/// Resolved placement target: alignment plus optional custom point in pixels.
#[derive(Debug, Clone, Copy)]
struct Placement {
    align: HAlign,
    vertical: VAlign,
    custom: Option<(f32, f32)>,
}

pub struct TextLayoutEngine {
    measurer: Arc<dyn TextMeasurer>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicMeasurer))
    }
}

impl TextLayoutEngine {
    pub fn new(measurer: Arc<dyn TextMeasurer>) -> Self {
        Self { measurer }
    }

    pub fn layout(&self, input: &LayoutInput<'_>) -> LayoutGeometry {
        let size = input.size;
        let overlay = input.overlay;
        let default_override = FormatOverride::default();
        let ovr = input.format_override.unwrap_or(&default_override);

        let band = Band::classify(size);
        let padding = padding_for(size);
        let position = ovr.custom_position.unwrap_or(overlay.position);
        let placement = resolve_position(position, size);

        let sizes = band::clamp_sizes(
            band::base_sizes(band, size, overlay.font_size_tier),
            ovr.effective_multiplier(),
        );
        let visibility = Visibility {
            headline: overlay.enabled && !ovr.hide_headline && !overlay.headline.trim().is_empty(),
            subheadline: overlay.enabled
                && !ovr.hide_subheadline
                && !band.suppresses_subheadline()
                && !overlay.subheadline.trim().is_empty(),
            cta: overlay.enabled && !ovr.hide_cta && !overlay.cta.trim().is_empty(),
        };

        let logo = input
            .logo_aspect
            .map(|aspect| place_logo(size, &input.brand.logo_rules, aspect));

        let brand = input.brand;
        let mut geometry = LayoutGeometry {
            width: size.width,
            height: size.height,
            band,
            padding,
            align: placement.align,
            vertical: placement.vertical,
            anchor_x: 0.0,
            block: Rect::default(),
            single_row: band.is_single_row(),
            font_family: brand.font_family.clone(),
            shadow: overlay.shadow,
            headline: TextElement::hidden(
                sizes.headline,
                FontWeight::Bold,
                overlay.headline_color.unwrap_or(brand.text_color),
            ),
            subheadline: TextElement::hidden(
                sizes.subheadline,
                FontWeight::Regular,
                overlay.subheadline_color.unwrap_or(brand.text_color),
            ),
            cta: CtaElement {
                visible: false,
                text: overlay.cta.trim().to_string(),
                font_size: sizes.cta,
                text_width: 0.0,
                button: Rect::default(),
                radius: 0.0,
                fill: overlay.cta_color.unwrap_or(brand.cta_color),
                text_color: overlay.cta_text_color.unwrap_or(brand.cta_text_color),
                text_x: 0.0,
                baseline: 0.0,
            },
            logo,
            overflow: None,
            notes: Vec::new(),
        };

        if band.is_single_row() {
            self.layout_row(&mut geometry, overlay, sizes, visibility, placement);
        } else {
            self.layout_stack(&mut geometry, overlay, sizes, visibility, placement);
        }

        tracing::debug!(
            width = size.width,
            height = size.height,
            band = ?band,
            headline = geometry.headline.font_size,
            cta_visible = geometry.cta.visible,
            "layout computed"
        );
        geometry
    }

    fn cta_box(&self, text: &str, font_size: f32, available: f32) -> Option<CtaBox> {
        let measure = |size: f32| self.measurer.measure(text, size, FontWeight::Bold);
        let mut font_size = font_size;
        let mut text_width = measure(font_size);
        let mut width = text_width + 2.0 * CTA_PAD_X * font_size;

        if width > available {
            font_size = (font_size * available / width).max(VISIBILITY_FLOOR);
            text_width = measure(font_size);
            width = text_width + 2.0 * CTA_PAD_X * font_size;
            if width > available + WIDTH_EPSILON {
                return None;
            }
        }
        if font_size < VISIBILITY_FLOOR {
            return None;
        }
        Some(CtaBox {
            font_size,
            text_width,
            width,
            height: font_size * CTA_HEIGHT,
        })
    }

    fn build_stack(&self, overlay: &TextOverlaySpec, sizes: FontSizes, vis: Visibility, available: f32) -> Stack {
        let wrap = |text: &str, size: f32, weight: FontWeight| -> Vec<(String, f32)> {
            wrap_text(text, size, weight, available, self.measurer.as_ref())
                .into_iter()
                .map(|line| {
                    let w = self.measurer.measure(&line, size, weight);
                    (line, w)
                })
                .collect()
        };

        let headline = if vis.headline {
            wrap(&overlay.headline, sizes.headline, FontWeight::Bold)
        } else {
            Vec::new()
        };
        let subheadline = if vis.subheadline {
            wrap(&overlay.subheadline, sizes.subheadline, FontWeight::Regular)
        } else {
            Vec::new()
        };
        let cta = if vis.cta {
            self.cta_box(overlay.cta.trim(), sizes.cta, available)
        } else {
            None
        };

        let mut height = 0.0;
        let mut stacked = false;
        for (lines, size) in [(&headline, sizes.headline), (&subheadline, sizes.subheadline)] {
            if lines.is_empty() {
                continue;
            }
            if stacked {
                height += size * ELEMENT_GAP;
            }
            height += lines.len() as f32 * size * LINE_HEIGHT;
            stacked = true;
        }
        if let Some(cta) = &cta {
            if stacked {
                height += cta.font_size * CTA_GAP;
            }
            height += cta.height;
        }

        let width = headline
            .iter()
            .chain(subheadline.iter())
            .map(|(_, w)| *w)
            .chain(cta.iter().map(|c| c.width))
            .fold(0.0, f32::max);

        Stack { sizes, headline, subheadline, cta, width, height }
    }

    fn layout_stack(
        &self,
        geometry: &mut LayoutGeometry,
        overlay: &TextOverlaySpec,
        sizes: FontSizes,
        vis: Visibility,
        placement: Placement,
    ) {
        let (w, h) = (geometry.width as f32, geometry.height as f32);
        let padding = geometry.padding;
        let available_w = w - 2.0 * padding;
        let available_h = h - padding;

        let mut scale = 1.0;
        let mut stack = self.build_stack(overlay, sizes, vis, available_w);
        for _ in 0..MAX_FIT_STEPS {
            if stack.height <= available_h || stack.sizes.at_floor() {
                break;
            }
            scale *= FIT_STEP;
            stack = self.build_stack(overlay, sizes.scaled(scale), vis, available_w);
        }
        if scale < 1.0 {
            geometry.notes.push(format!(
                "Text scaled to {:.0}% to fit the canvas height",
                scale * 100.0
            ));
        }
        if vis.cta && stack.cta.is_none() {
            geometry.notes.push("CTA hidden: button does not fit at the minimum size".to_string());
        }
        if stack.height > available_h {
            geometry.overflow = Some(LayoutOverflow {
                block_height: stack.height,
                available_height: available_h,
            });
        }

        let anchor_x = resolve_anchor_x(placement, w, padding, stack.width);
        let block_x = aligned_x(placement.align, anchor_x, stack.width);
        let mut y0 = clamp_block_y(initial_block_y(placement, h, padding, stack.height), h, padding, stack.height);
        let block = Rect::new(block_x, y0, stack.width, stack.height);
        if let Some(logo) = &geometry.logo {
            y0 = avoid_logo(block, &logo.rect, placement.vertical, h, padding, &mut geometry.notes);
        }

        geometry.anchor_x = anchor_x;
        geometry.block = Rect::new(block_x, y0, stack.width, stack.height);

        let mut cursor = y0;
        let mut stacked = false;
        for (element, lines, size) in [
            (&mut geometry.headline, &stack.headline, stack.sizes.headline),
            (&mut geometry.subheadline, &stack.subheadline, stack.sizes.subheadline),
        ] {
            element.font_size = size;
            element.line_height = size * LINE_HEIGHT;
            if lines.is_empty() {
                continue;
            }
            if stacked {
                cursor += size * ELEMENT_GAP;
            }
            element.visible = true;
            element.lines = position_lines(lines, placement.align, anchor_x, cursor, size);
            cursor += element.height();
            stacked = true;
        }

        match &stack.cta {
            Some(cta) => {
                if stacked {
                    cursor += cta.font_size * CTA_GAP;
                }
                let x = aligned_x(placement.align, anchor_x, cta.width);
                fill_cta(&mut geometry.cta, cta, Rect::new(x, cursor, cta.width, cta.height));
            }
            None => geometry.cta.font_size = stack.sizes.cta,
        }
    }

    /// verySmall canvases: one row, headline and CTA side by side when both fit.
    fn layout_row(
        &self,
        geometry: &mut LayoutGeometry,
        overlay: &TextOverlaySpec,
        sizes: FontSizes,
        vis: Visibility,
        placement: Placement,
    ) {
        let (w, h) = (geometry.width as f32, geometry.height as f32);
        let padding = geometry.padding;
        let available_w = w - 2.0 * padding;
        let available_h = h - padding;
        let gap = padding;
        let m = self.measurer.as_ref();
        let headline_text = overlay.headline.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut headline_size = sizes.headline.min(available_h / LINE_HEIGHT).max(band::HEADLINE_MIN);
        let mut cta_size = sizes.cta.min(available_h / CTA_HEIGHT).max(band::CTA_MIN);
        let mut show_cta = vis.cta;

        if vis.headline && show_cta {
            let headline_w = m.measure(&headline_text, headline_size, FontWeight::Bold);
            let cta_w = self.cta_box(overlay.cta.trim(), cta_size, f32::MAX).map(|c| c.width).unwrap_or(0.0);
            let total = headline_w + gap + cta_w;
            if total > available_w {
                let factor = (available_w - gap) / (total - gap);
                headline_size = (headline_size * factor).max(band::HEADLINE_MIN);
                cta_size = (cta_size * factor).max(band::CTA_MIN);
                let headline_w = m.measure(&headline_text, headline_size, FontWeight::Bold);
                let cta_w = self.cta_box(overlay.cta.trim(), cta_size, f32::MAX).map(|c| c.width).unwrap_or(0.0);
                if headline_w + gap + cta_w > available_w + WIDTH_EPSILON {
                    show_cta = false;
                    geometry.notes.push("CTA hidden: no room beside the headline".to_string());
                }
            }
        }

        let cta = if show_cta {
            let room = if vis.headline {
                let headline_w = m.measure(&headline_text, headline_size, FontWeight::Bold);
                available_w - headline_w - gap
            } else {
                available_w
            };
            let cta = self.cta_box(overlay.cta.trim(), cta_size, room);
            if cta.is_none() {
                geometry.notes.push("CTA hidden: button does not fit at the minimum size".to_string());
            }
            cta
        } else {
            None
        };

        let mut headline_line = None;
        if vis.headline {
            let room = available_w - cta.as_ref().map(|c| c.width + gap).unwrap_or(0.0);
            let mut width = m.measure(&headline_text, headline_size, FontWeight::Bold);
            if width > room {
                headline_size = (headline_size * room / width).max(band::HEADLINE_MIN);
                width = m.measure(&headline_text, headline_size, FontWeight::Bold);
            }
            let mut text = headline_text.clone();
            if width > room + WIDTH_EPSILON {
                text = truncate_to_width(&headline_text, headline_size, FontWeight::Bold, room, m);
                width = m.measure(&text, headline_size, FontWeight::Bold);
                geometry.notes.push("Headline truncated to fit a single line".to_string());
            }
            if !text.is_empty() {
                headline_line = Some((text, width));
            }
        }

        let line_height = headline_size * LINE_HEIGHT;
        let row_h = headline_line
            .as_ref()
            .map(|_| line_height)
            .unwrap_or(0.0)
            .max(cta.as_ref().map(|c| c.height).unwrap_or(0.0));
        let row_gap = match (&headline_line, &cta) {
            (Some(_), Some(_)) => gap,
            _ => 0.0,
        };
        let row_w = headline_line.as_ref().map(|(_, w)| *w).unwrap_or(0.0)
            + cta.as_ref().map(|c| c.width).unwrap_or(0.0)
            + row_gap;

        if row_h > available_h {
            geometry.overflow = Some(LayoutOverflow { block_height: row_h, available_height: available_h });
        }

        let anchor_x = resolve_anchor_x(placement, w, padding, row_w);
        let row_x = aligned_x(placement.align, anchor_x, row_w);
        let mut y0 = clamp_block_y(initial_block_y(placement, h, padding, row_h), h, padding, row_h);
        if let Some(logo) = &geometry.logo {
            y0 = avoid_logo(Rect::new(row_x, y0, row_w, row_h), &logo.rect, placement.vertical, h, padding, &mut geometry.notes);
        }

        geometry.anchor_x = anchor_x;
        geometry.block = Rect::new(row_x, y0, row_w, row_h);
        geometry.headline.font_size = headline_size;
        geometry.headline.line_height = line_height;

        let mut x = row_x;
        if let Some((text, width)) = headline_line {
            let top = y0 + (row_h - line_height) / 2.0;
            geometry.headline.visible = true;
            geometry.headline.lines = vec![TextLine {
                baseline: baseline_for(top, headline_size),
                text,
                x,
                y: top,
                width,
            }];
            x += width + gap;
        }
        match &cta {
            Some(cta) => {
                let top = y0 + (row_h - cta.height) / 2.0;
                fill_cta(&mut geometry.cta, cta, Rect::new(x, top, cta.width, cta.height));
            }
            None => geometry.cta.font_size = cta_size,
        }
    }
}

fn resolve_position(position: OverlayPosition, size: Size) -> Placement {
    match position {
        OverlayPosition::Anchor(anchor) => Placement {
            align: anchor.horizontal(),
            vertical: anchor.vertical(),
            custom: None,
        },
        OverlayPosition::Custom(custom) => Placement {
            align: HAlign::Center,
            vertical: VAlign::Center,
            custom: Some((
                custom.x_percent.clamp(0.0, 100.0) / 100.0 * size.width as f32,
                custom.y_percent.clamp(0.0, 100.0) / 100.0 * size.height as f32,
            )),
        },
    }
}

fn resolve_anchor_x(placement: Placement, width: f32, padding: f32, block_width: f32) -> f32 {
    match (placement.custom, placement.align) {
        (Some((cx, _)), _) => {
            let lo = padding + block_width / 2.0;
            let hi = width - padding - block_width / 2.0;
            if lo > hi {
                width / 2.0
            } else {
                cx.clamp(lo, hi)
            }
        }
        (None, HAlign::Left) => padding,
        (None, HAlign::Center) => width / 2.0,
        (None, HAlign::Right) => width - padding,
    }
}

fn aligned_x(align: HAlign, anchor_x: f32, width: f32) -> f32 {
    match align {
        HAlign::Left => anchor_x,
        HAlign::Center => anchor_x - width / 2.0,
        HAlign::Right => anchor_x - width,
    }
}

fn initial_block_y(placement: Placement, height: f32, padding: f32, block_h: f32) -> f32 {
    if let Some((_, cy)) = placement.custom {
        return cy - block_h / 2.0;
    }
    match placement.vertical {
        VAlign::Top => padding,
        VAlign::Center => (height - block_h) / 2.0,
        VAlign::Bottom => height - padding - block_h,
    }
}

/// Keep the block within `[padding/2, height - padding/2]`.
fn clamp_block_y(y: f32, height: f32, padding: f32, block_h: f32) -> f32 {
    let lo = padding / 2.0;
    let hi = height - padding / 2.0 - block_h;
    if hi < lo {
        lo
    } else {
        y.clamp(lo, hi)
    }
}

/// Move the block vertically off the logo when possible. Returns the new top.
fn avoid_logo(block: Rect, logo: &Rect, vertical: VAlign, height: f32, padding: f32, notes: &mut Vec<String>) -> f32 {
    if !block.intersects(logo) {
        return block.y;
    }
    let gap = padding / 2.0;
    let lo = padding / 2.0;
    let hi = height - padding / 2.0 - block.height;
    let below = logo.bottom() + gap;
    let above = logo.y - gap - block.height;
    let order = match vertical {
        VAlign::Bottom => [above, below],
        VAlign::Top | VAlign::Center => [below, above],
    };
    for candidate in order {
        if candidate >= lo && candidate <= hi {
            return candidate;
        }
    }
    notes.push("Logo overlaps the text block".to_string());
    block.y
}

fn baseline_for(top: f32, font_size: f32) -> f32 {
    top + (font_size * LINE_HEIGHT - font_size) / 2.0 + font_size * ASCENT
}

fn position_lines(lines: &[(String, f32)], align: HAlign, anchor_x: f32, top: f32, font_size: f32) -> Vec<TextLine> {
    let line_height = font_size * LINE_HEIGHT;
    lines
        .iter()
        .enumerate()
        .map(|(i, (text, width))| {
            let y = top + i as f32 * line_height;
            TextLine {
                text: text.clone(),
                x: aligned_x(align, anchor_x, *width),
                y,
                width: *width,
                baseline: baseline_for(y, font_size),
            }
        })
        .collect()
}

fn fill_cta(element: &mut CtaElement, cta: &CtaBox, button: Rect) {
    element.visible = true;
    element.font_size = cta.font_size;
    element.text_width = cta.text_width;
    element.radius = (cta.height / 2.5).min(CTA_MAX_RADIUS);
    element.text_x = button.x + (button.width - cta.text_width) / 2.0;
    element.baseline = button.y + button.height / 2.0 + cta.font_size * 0.35;
    element.button = button;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{CustomPosition, FontSizeTier};

    fn overlay(headline: &str, sub: &str, cta: &str) -> TextOverlaySpec {
        TextOverlaySpec {
            headline: headline.to_string(),
            subheadline: sub.to_string(),
            cta: cta.to_string(),
            ..Default::default()
        }
    }

    fn run(size: Size, overlay: &TextOverlaySpec, ovr: Option<&FormatOverride>) -> LayoutGeometry {
        let brand = BrandKit::default();
        TextLayoutEngine::default().layout(&LayoutInput {
            size,
            overlay,
            format_override: ovr,
            brand: &brand,
            logo_aspect: None,
        })
    }

    #[test]
    fn medium_rectangle_shows_everything() {
        let o = overlay("Black Friday Sleva 50%", "Jen do neděle", "Koupit");
        let g = run(Size::new(300, 250), &o, None);
        assert_eq!(g.band, Band::Normal);
        assert!(g.headline.visible && g.subheadline.visible && g.cta.visible);
        assert!((g.headline.font_size - 25.0).abs() < 1e-3);
        assert!(g.overflow.is_none());
    }

    #[test]
    fn bottom_anchor_stacks_cta_nearest_edge() {
        let o = overlay("Headline", "Sub", "Go");
        let g = run(Size::new(300, 250), &o, None);
        let headline_y = g.headline.lines[0].y;
        let sub_y = g.subheadline.lines[0].y;
        assert!(headline_y < sub_y);
        assert!(sub_y < g.cta.button.y);
        assert!((g.cta.button.bottom() - (250.0 - g.padding)).abs() < 1e-3);
    }

    #[test]
    fn top_anchor_starts_at_padding() {
        let mut o = overlay("Headline", "", "");
        o.position = OverlayPosition::Anchor(Anchor::TopLeft);
        let g = run(Size::new(300, 250), &o, None);
        assert_eq!(g.align, HAlign::Left);
        assert!((g.block.y - g.padding).abs() < 1e-3);
        assert!((g.headline.lines[0].x - g.padding).abs() < 1e-3);
    }

    #[test]
    fn wide_band_hides_subheadline() {
        let o = overlay("Headline", "Sub", "Go");
        let g = run(Size::new(728, 90), &o, None);
        assert_eq!(g.band, Band::Wide);
        assert!(!g.subheadline.visible);
    }

    #[test]
    fn very_small_is_single_row() {
        let o = overlay("Black Friday Sleva 50%", "Jen do neděle", "Koupit");
        let g = run(Size::new(320, 50), &o, None);
        assert!(g.single_row);
        assert!(!g.subheadline.visible);
        assert!(g.headline.lines.len() <= 1);
        assert!(!g.cta.visible || g.cta.font_size >= VISIBILITY_FLOOR);
        if g.cta.visible {
            assert!(g.cta.button.x >= g.headline.lines[0].x + g.headline.lines[0].width);
            assert!(g.cta.button.right() <= 320.0 - g.padding + 0.01);
        }
    }

    #[test]
    fn override_hides_elements_and_moves_anchor() {
        let o = overlay("Headline", "Sub", "Go");
        let ovr = FormatOverride {
            hide_cta: true,
            custom_position: Some(OverlayPosition::Anchor(Anchor::TopRight)),
            ..Default::default()
        };
        let g = run(Size::new(300, 250), &o, Some(&ovr));
        assert!(!g.cta.visible);
        assert_eq!(g.align, HAlign::Right);
        let line = &g.headline.lines[0];
        assert!((line.x + line.width - (300.0 - g.padding)).abs() < 1e-3);
    }

    #[test]
    fn multiplier_applies_before_clamp() {
        let o = overlay("Headline", "", "");
        let ovr = FormatOverride { font_size_multiplier: 2.0, ..Default::default() };
        let g = run(Size::new(300, 250), &o, Some(&ovr));
        assert!((g.headline.font_size - 50.0).abs() < 1e-3);
    }

    #[test]
    fn custom_position_is_clamped_inside() {
        let mut o = overlay("Headline", "", "");
        o.position = OverlayPosition::Custom(CustomPosition { x_percent: 100.0, y_percent: 100.0 });
        let g = run(Size::new(300, 250), &o, None);
        assert!(g.block.right() <= 300.0 - g.padding + 0.01);
        assert!(g.block.bottom() <= 250.0 - g.padding / 2.0 + 0.01);
    }

    #[test]
    fn disabled_overlay_draws_nothing() {
        let mut o = overlay("Headline", "Sub", "Go");
        o.enabled = false;
        let g = run(Size::new(300, 250), &o, None);
        assert!(!g.has_text());
    }

    #[test]
    fn cta_radius_capped() {
        let mut o = overlay("", "", "Buy now");
        o.font_size_tier = FontSizeTier::Large;
        let g = run(Size::new(1200, 1200), &o, None);
        assert!(g.cta.visible);
        assert!(g.cta.radius <= 6.0);
    }

    #[test]
    fn overlong_copy_on_small_canvas_is_fit_or_flagged() {
        let long = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt ut labore et dolore magna aliqua";
        let o = overlay(long, long, "Go");
        let g = run(Size::new(300, 250), &o, None);
        let fits = g.block.height <= 250.0 - g.padding;
        assert!(fits || g.overflow.is_some());
        assert!(!g.notes.is_empty());
    }

    #[test]
    fn logo_and_text_do_not_overlap() {
        let mut o = overlay("Headline that is long enough", "", "");
        o.position = OverlayPosition::Anchor(Anchor::TopCenter);
        let mut brand = BrandKit::default();
        brand.logo_rules.position = Anchor::TopCenter;
        let g = TextLayoutEngine::default().layout(&LayoutInput {
            size: Size::new(300, 600),
            overlay: &o,
            format_override: None,
            brand: &brand,
            logo_aspect: Some(1.0),
        });
        let logo = g.logo.as_ref().unwrap();
        assert!(!g.block.intersects(&logo.rect));
    }

    #[test]
    fn logo_geometry_follows_rules() {
        let rules = LogoRules {
            position: Anchor::BottomLeft,
            size_percent: 20.0,
            padding_px: 10.0,
            opacity_percent: 50.0,
            ..Default::default()
        };
        let p = place_logo(Size::new(300, 250), &rules, 2.0);
        assert_eq!(p.rect, Rect::new(10.0, 250.0 - 10.0 - 25.0, 50.0, 25.0));
        assert_eq!(p.opacity, 0.5);
    }
}
