//! Draw Commands - layout geometry as an ordered, backend-neutral list
//!
//! Backends implement `Canvas`; the command order is the paint order.

use serde::{Deserialize, Serialize};

use crate::brand::Color;
use crate::catalog::FormatSpec;
use crate::error::EngineResult;
use crate::geometry::Rect;
use crate::layout::{FontWeight, LayoutGeometry};
use crate::overlay::ShadowSpec;

/// Image resources a command can reference; the canvas owns the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSlot {
    Background,
    Logo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum DrawCommand {
    FillRect {
        rect: Rect,
        color: Color,
    },
    DrawImage {
        slot: ImageSlot,
        rect: Rect,
        opacity: f32,
    },
    StrokeRect {
        rect: Rect,
        color: Color,
        width: f32,
    },
    #[serde(rename_all = "camelCase")]
    DrawText {
        text: String,
        x: f32,
        baseline: f32,
        font_size: f32,
        weight: FontWeight,
        font_family: String,
        color: Color,
        shadow: Option<ShadowSpec>,
    },
    DrawRoundedRect {
        rect: Rect,
        radius: f32,
        color: Color,
    },
}

pub trait Canvas {
    fn fill_rect(&mut self, rect: Rect, color: Color) -> EngineResult<()>;
    fn draw_image(&mut self, slot: ImageSlot, rect: Rect, opacity: f32) -> EngineResult<()>;
    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32) -> EngineResult<()>;
    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        baseline: f32,
        font_size: f32,
        weight: FontWeight,
        font_family: &str,
        color: Color,
        shadow: Option<&ShadowSpec>,
    ) -> EngineResult<()>;
    fn draw_rounded_rect(&mut self, rect: Rect, radius: f32, color: Color) -> EngineResult<()>;

    fn execute(&mut self, commands: &[DrawCommand]) -> EngineResult<()> {
        for command in commands {
            match command {
                DrawCommand::FillRect { rect, color } => self.fill_rect(*rect, *color)?,
                DrawCommand::DrawImage { slot, rect, opacity } => self.draw_image(*slot, *rect, *opacity)?,
                DrawCommand::StrokeRect { rect, color, width } => self.stroke_rect(*rect, *color, *width)?,
                DrawCommand::DrawText {
                    text,
                    x,
                    baseline,
                    font_size,
                    weight,
                    font_family,
                    color,
                    shadow,
                } => self.draw_text(text, *x, *baseline, *font_size, *weight, font_family, *color, shadow.as_ref())?,
                DrawCommand::DrawRoundedRect { rect, radius, color } => {
                    self.draw_rounded_rect(*rect, *radius, *color)?
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    pub background_color: Color,
    pub has_background_image: bool,
    pub has_logo: bool,
    pub debug_safe_zone: bool,
    /// Used for headline and subheadline when the overlay has no shadow.
    pub default_shadow: Option<ShadowSpec>,
}

const SAFE_ZONE_OUTLINE: Color = Color { r: 255, g: 0, b: 255, a: 200 };

/// Translate one format's geometry into paint-ordered commands.
pub fn build_draw_list(geometry: &LayoutGeometry, format: &FormatSpec, options: &DrawOptions) -> Vec<DrawCommand> {
    let canvas = Rect::new(0.0, 0.0, geometry.width as f32, geometry.height as f32);
    let mut commands = vec![DrawCommand::FillRect {
        rect: canvas,
        color: options.background_color,
    }];

    if options.has_background_image {
        commands.push(DrawCommand::DrawImage {
            slot: ImageSlot::Background,
            rect: canvas,
            opacity: 1.0,
        });
    }

    if options.debug_safe_zone {
        if let Some(zone) = &format.safe_zone {
            commands.push(DrawCommand::StrokeRect {
                rect: zone.visible_rect(format.width),
                color: SAFE_ZONE_OUTLINE,
                width: 2.0,
            });
            if let Some(center) = zone.center_rect(format.width, format.height) {
                commands.push(DrawCommand::StrokeRect {
                    rect: center,
                    color: SAFE_ZONE_OUTLINE,
                    width: 2.0,
                });
            }
        }
    }

    let shadow = geometry.shadow.or(options.default_shadow);
    for element in [&geometry.headline, &geometry.subheadline] {
        if !element.visible {
            continue;
        }
        for line in &element.lines {
            commands.push(DrawCommand::DrawText {
                text: line.text.clone(),
                x: line.x,
                baseline: line.baseline,
                font_size: element.font_size,
                weight: element.weight,
                font_family: geometry.font_family.clone(),
                color: element.color,
                shadow,
            });
        }
    }

    let cta = &geometry.cta;
    if cta.visible {
        commands.push(DrawCommand::DrawRoundedRect {
            rect: cta.button,
            radius: cta.radius,
            color: cta.fill,
        });
        commands.push(DrawCommand::DrawText {
            text: cta.text.clone(),
            x: cta.text_x,
            baseline: cta.baseline,
            font_size: cta.font_size,
            weight: FontWeight::Bold,
            font_family: geometry.font_family.clone(),
            color: cta.text_color,
            shadow: None,
        });
    }

    if options.has_logo {
        if let Some(logo) = &geometry.logo {
            commands.push(DrawCommand::DrawImage {
                slot: ImageSlot::Logo,
                rect: logo.rect,
                opacity: logo.opacity,
            });
        }
    }

    commands
}

/// Escape text for XML/HTML attribute and element content.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand::BrandKit;
    use crate::catalog::FormatCatalog;
    use crate::layout::{LayoutInput, TextLayoutEngine};
    use crate::overlay::TextOverlaySpec;

    fn geometry_for(id: &str, with_logo: bool) -> (LayoutGeometry, FormatSpec) {
        let catalog = FormatCatalog::builtin().unwrap();
        let format = catalog.get(id).unwrap().clone();
        let overlay = TextOverlaySpec {
            headline: "Black Friday".into(),
            subheadline: "Sleva 50%".into(),
            cta: "Koupit".into(),
            ..Default::default()
        };
        let brand = BrandKit::default();
        let geometry = TextLayoutEngine::default().layout(&LayoutInput {
            size: format.size(),
            overlay: &overlay,
            format_override: None,
            brand: &brand,
            logo_aspect: if with_logo { Some(1.0) } else { None },
        });
        (geometry, format)
    }

    #[test]
    fn paint_order_is_background_text_cta_logo() {
        let (geometry, format) = geometry_for("sklik-300x250", true);
        let options = DrawOptions {
            has_background_image: true,
            has_logo: true,
            ..Default::default()
        };
        let list = build_draw_list(&geometry, &format, &options);
        assert!(matches!(list[0], DrawCommand::FillRect { .. }));
        assert!(matches!(list[1], DrawCommand::DrawImage { slot: ImageSlot::Background, .. }));
        assert!(matches!(list.last(), Some(DrawCommand::DrawImage { slot: ImageSlot::Logo, .. })));
        let button = list.iter().position(|c| matches!(c, DrawCommand::DrawRoundedRect { .. })).unwrap();
        assert!(matches!(list[button + 1], DrawCommand::DrawText { .. }));
    }

    #[test]
    fn safe_zone_outline_only_in_debug() {
        let (geometry, format) = geometry_for("sklik-branding-2000x1400", false);
        let plain = build_draw_list(&geometry, &format, &DrawOptions::default());
        assert!(!plain.iter().any(|c| matches!(c, DrawCommand::StrokeRect { .. })));
        let debug = build_draw_list(
            &geometry,
            &format,
            &DrawOptions { debug_safe_zone: true, ..Default::default() },
        );
        assert_eq!(debug.iter().filter(|c| matches!(c, DrawCommand::StrokeRect { .. })).count(), 2);
    }

    #[test]
    fn default_shadow_fills_in() {
        let (geometry, format) = geometry_for("sklik-300x250", false);
        let options = DrawOptions {
            default_shadow: Some(ShadowSpec::default()),
            ..Default::default()
        };
        let list = build_draw_list(&geometry, &format, &options);
        let headline_shadow = list.iter().find_map(|c| match c {
            DrawCommand::DrawText { shadow, .. } => Some(*shadow),
            _ => None,
        });
        assert_eq!(headline_shadow, Some(Some(ShadowSpec::default())));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_markup("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
