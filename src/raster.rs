//! Raster Composer
//!
//! Executes the draw list on a tiny-skia pixmap. Text goes through
//! usvg/resvg so system fonts resolve the same way SVG rendering does.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use resvg::tiny_skia::{self, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform};
use resvg::usvg;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::brand::Color;
use crate::catalog::FormatSpec;
use crate::draw::{build_draw_list, escape_markup, Canvas, DrawOptions, ImageSlot};
use crate::error::{EngineError, EngineResult};
use crate::fonts::FontLibrary;
use crate::geometry::Rect;
use crate::layout::{FontWeight, LayoutGeometry};
use crate::overlay::ShadowSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Png => "png",
        }
    }

    /// JPEG where the format allows it, PNG otherwise.
    pub fn for_format(spec: &FormatSpec, prefer_png: bool) -> Self {
        let jpeg = spec.allows("jpg") || spec.allows("jpeg");
        let png = spec.allows("png");
        match (jpeg, png) {
            (_, true) if prefer_png => RasterFormat::Png,
            (true, _) => RasterFormat::Jpeg,
            (false, true) => RasterFormat::Png,
            (false, false) => RasterFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RasterArtifact {
    pub bytes: Vec<u8>,
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
}

impl RasterArtifact {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }
}

/// Per-render image resources referenced by `ImageSlot`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterInputs<'a> {
    pub background: Option<&'a RgbaImage>,
    pub logo: Option<&'a RgbaImage>,
    pub background_color: Color,
    pub default_shadow: Option<ShadowSpec>,
}

pub struct RasterComposer {
    fonts: Arc<FontLibrary>,
    jpeg_quality: u8,
    prefer_png: bool,
    debug_safe_zone: bool,
}

impl RasterComposer {
    pub fn new(fonts: Arc<FontLibrary>, jpeg_quality: u8, prefer_png: bool, debug_safe_zone: bool) -> Self {
        Self {
            fonts,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            prefer_png,
            debug_safe_zone,
        }
    }

    #[tracing::instrument(skip_all, fields(format = %format.id))]
    pub fn compose(
        &self,
        format: &FormatSpec,
        geometry: &LayoutGeometry,
        inputs: &RasterInputs<'_>,
    ) -> EngineResult<RasterArtifact> {
        let options = DrawOptions {
            background_color: inputs.background_color,
            has_background_image: inputs.background.is_some(),
            has_logo: inputs.logo.is_some(),
            debug_safe_zone: self.debug_safe_zone,
            default_shadow: inputs.default_shadow,
        };
        let commands = build_draw_list(geometry, format, &options);

        let mut canvas = PixmapCanvas::new(geometry.width, geometry.height, self.fonts.clone())?
            .with_image(ImageSlot::Background, inputs.background)
            .with_image(ImageSlot::Logo, inputs.logo);
        canvas.execute(&commands)?;

        let raster_format = RasterFormat::for_format(format, self.prefer_png);
        let bytes = encode(&canvas.into_rgba(), raster_format, self.jpeg_quality)?;
        tracing::debug!(bytes = bytes.len(), ext = raster_format.extension(), "raster encoded");

        Ok(RasterArtifact {
            bytes,
            format: raster_format,
            width: geometry.width,
            height: geometry.height,
        })
    }
}

pub fn encode(image: &RgbaImage, format: RasterFormat, jpeg_quality: u8) -> EngineResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let (w, h) = image.dimensions();
    match format {
        RasterFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, jpeg_quality)
                .encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
        RasterFormat::Png => {
            PngEncoder::new(&mut bytes)
                .write_image(image.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
    }
    Ok(bytes)
}

/// Mean luminance of the pixels under `rect`, `None` if the rect misses the image.
pub fn region_luminance(image: &RgbaImage, rect: &Rect) -> Option<f32> {
    let (w, h) = image.dimensions();
    let x0 = rect.x.max(0.0).floor() as u32;
    let y0 = rect.y.max(0.0).floor() as u32;
    let x1 = (rect.right().ceil().max(0.0) as u32).min(w);
    let y1 = (rect.bottom().ceil().max(0.0) as u32).min(h);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    let mut sum = 0.0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            let p = image.get_pixel(x, y);
            sum += Color::rgb(p[0], p[1], p[2]).luminance() as f64;
        }
    }
    Some((sum / ((x1 - x0) * (y1 - y0)) as f64) as f32)
}

fn premultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut data = image.as_raw().clone();
    premultiply(&mut data);
    Pixmap::from_vec(data, tiny_skia::IntSize::from_wh(image.width(), image.height())?)
}

fn paint_for(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn rounded_rect_path(rect: Rect, radius: f32) -> Option<tiny_skia::Path> {
    let r = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.quad_to(x + w, y, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.quad_to(x + w, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.quad_to(x, y + h, x, y + h - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

/// `Canvas` backed by a premultiplied tiny-skia pixmap.
pub struct PixmapCanvas {
    pixmap: Pixmap,
    fonts: Arc<FontLibrary>,
    background: Option<RgbaImage>,
    logo: Option<RgbaImage>,
}

impl PixmapCanvas {
    pub fn new(width: u32, height: u32, fonts: Arc<FontLibrary>) -> EngineResult<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| EngineError::Encode(format!("cannot allocate {}x{} canvas", width, height)))?;
        Ok(Self {
            pixmap,
            fonts,
            background: None,
            logo: None,
        })
    }

    pub fn with_image(mut self, slot: ImageSlot, image: Option<&RgbaImage>) -> Self {
        let image = image.cloned();
        match slot {
            ImageSlot::Background => self.background = image,
            ImageSlot::Logo => self.logo = image,
        }
        self
    }

    /// Straight-alpha RGBA copy of the canvas.
    pub fn into_rgba(self) -> RgbaImage {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(w, h, data).unwrap_or_else(|| RgbaImage::new(w, h))
    }

    #[allow(clippy::too_many_arguments)]
    fn text_svg(
        &self,
        text: &str,
        x: f32,
        baseline: f32,
        font_size: f32,
        weight: FontWeight,
        font_family: &str,
        color: Color,
        shadow: Option<&ShadowSpec>,
    ) -> String {
        let (filter_def, filter_attr) = match shadow {
            Some(s) => (
                format!(
                    r#"<defs><filter id="shadow" x="-20%" y="-50%" width="140%" height="200%"><feDropShadow dx="{:.2}" dy="{:.2}" stdDeviation="{:.2}" flood-color="{}" flood-opacity="{:.3}"/></filter></defs>"#,
                    s.offset_x,
                    s.offset_y,
                    s.blur / 2.0,
                    s.color.with_alpha(255).to_hex(),
                    s.color.a as f32 / 255.0
                ),
                r#" filter="url(#shadow)""#,
            ),
            None => (String::new(), ""),
        };
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{defs}<text x="{x:.2}" y="{y:.2}" font-family="{family}" font-size="{size:.2}" font-weight="{weight}" fill="{fill}" fill-opacity="{opacity:.3}" xml:space="preserve"{filter}>{text}</text></svg>"#,
            w = self.pixmap.width(),
            h = self.pixmap.height(),
            defs = filter_def,
            x = x,
            y = baseline,
            family = escape_markup(&self.fonts.svg_family(font_family)),
            size = font_size,
            weight = weight.css_value(),
            fill = color.with_alpha(255).to_hex(),
            opacity = color.a as f32 / 255.0,
            filter = filter_attr,
            text = escape_markup(text),
        )
    }
}

impl Canvas for PixmapCanvas {
    fn fill_rect(&mut self, rect: Rect, color: Color) -> EngineResult<()> {
        if let Some(r) = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height) {
            self.pixmap.fill_rect(r, &paint_for(color), Transform::identity(), None);
        }
        Ok(())
    }

    fn draw_image(&mut self, slot: ImageSlot, rect: Rect, opacity: f32) -> EngineResult<()> {
        let source = match slot {
            ImageSlot::Background => self.background.as_ref(),
            ImageSlot::Logo => self.logo.as_ref(),
        };
        let Some(source) = source else {
            return Ok(());
        };
        let w = rect.width.round().max(1.0) as u32;
        let h = rect.height.round().max(1.0) as u32;
        let scaled;
        let image = if source.dimensions() == (w, h) {
            source
        } else {
            scaled = image::imageops::resize(source, w, h, FilterType::Lanczos3);
            &scaled
        };
        let pixmap = to_pixmap(image)
            .ok_or_else(|| EngineError::Encode("cannot convert image to pixmap".to_string()))?;
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            rect.x.round() as i32,
            rect.y.round() as i32,
            pixmap.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32) -> EngineResult<()> {
        let inset = width / 2.0;
        let Some(r) = tiny_skia::Rect::from_xywh(
            rect.x + inset,
            rect.y + inset,
            (rect.width - width).max(1.0),
            (rect.height - width).max(1.0),
        ) else {
            return Ok(());
        };
        let path = PathBuilder::from_rect(r);
        let stroke = Stroke { width, ..Stroke::default() };
        self.pixmap.stroke_path(&path, &paint_for(color), &stroke, Transform::identity(), None);
        Ok(())
    }

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
    ) -> EngineResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let svg = self.text_svg(text, x, baseline, font_size, weight, font_family, color, shadow);
        let options = usvg::Options {
            fontdb: self.fonts.database(),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(&svg, &options)
            .map_err(|e| EngineError::Encode(format!("text layer: {}", e)))?;
        resvg::render(&tree, Transform::identity(), &mut self.pixmap.as_mut());
        Ok(())
    }

    fn draw_rounded_rect(&mut self, rect: Rect, radius: f32, color: Color) -> EngineResult<()> {
        if let Some(path) = rounded_rect_path(rect, radius) {
            self.pixmap
                .fill_path(&path, &paint_for(color), FillRule::Winding, Transform::identity(), None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand::BrandKit;
    use crate::catalog::FormatCatalog;
    use crate::fonts::FontMeasurer;
    use crate::layout::{LayoutInput, TextLayoutEngine};
    use crate::overlay::TextOverlaySpec;
    use image::Rgba;

    fn fonts() -> Arc<FontLibrary> {
        Arc::new(FontLibrary::embedded())
    }

    fn composer() -> RasterComposer {
        RasterComposer::new(fonts(), 90, false, false)
    }

    fn geometry(format: &FormatSpec) -> LayoutGeometry {
        let overlay = TextOverlaySpec {
            headline: "Black Friday Sleva 50%".into(),
            cta: "Koupit".into(),
            ..Default::default()
        };
        TextLayoutEngine::default().layout(&LayoutInput {
            size: format.size(),
            overlay: &overlay,
            format_override: None,
            brand: &BrandKit::default(),
            logo_aspect: None,
        })
    }

    #[test]
    fn composes_jpeg_at_target_size() {
        let catalog = FormatCatalog::builtin().unwrap();
        let format = catalog.get("sklik-300x250").unwrap();
        let background = RgbaImage::from_fn(300, 250, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 120, 255]));
        let inputs = RasterInputs {
            background: Some(&background),
            background_color: Color::BLACK,
            ..Default::default()
        };
        let artifact = composer().compose(format, &geometry(format), &inputs).unwrap();
        assert_eq!(artifact.format, RasterFormat::Jpeg);
        assert_eq!(&artifact.bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 250));
        assert!(artifact.size_kb() < 150.0);
    }

    #[test]
    fn png_when_jpeg_not_allowed() {
        let mut format = FormatCatalog::builtin().unwrap().get("sklik-300x250").unwrap().clone();
        format.allowed_file_types = vec!["png".into()];
        assert_eq!(RasterFormat::for_format(&format, false), RasterFormat::Png);
        format.allowed_file_types = vec!["jpg".into(), "png".into()];
        assert_eq!(RasterFormat::for_format(&format, true), RasterFormat::Png);
        assert_eq!(RasterFormat::for_format(&format, false), RasterFormat::Jpeg);
    }

    #[test]
    fn rounded_button_is_painted() {
        let mut canvas = PixmapCanvas::new(100, 50, fonts()).unwrap();
        canvas.fill_rect(Rect::new(0.0, 0.0, 100.0, 50.0), Color::WHITE).unwrap();
        canvas
            .draw_rounded_rect(Rect::new(10.0, 10.0, 80.0, 30.0), 6.0, Color::rgb(255, 0, 0))
            .unwrap();
        let img = canvas.into_rgba();
        assert_eq!(img.get_pixel(50, 25), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn logo_opacity_blends() {
        let logo = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let mut canvas = PixmapCanvas::new(20, 20, fonts()).unwrap().with_image(ImageSlot::Logo, Some(&logo));
        canvas.fill_rect(Rect::new(0.0, 0.0, 20.0, 20.0), Color::WHITE).unwrap();
        canvas.draw_image(ImageSlot::Logo, Rect::new(5.0, 5.0, 10.0, 10.0), 0.5).unwrap();
        let px = canvas.into_rgba().get_pixel(10, 10).0;
        assert!(px[0] > 100 && px[0] < 155, "expected mid grey, got {:?}", px);
    }

    /// White headline on black, no shadow, rendered to PNG and decoded.
    fn render_headline(brand: &BrandKit, fonts: Arc<FontLibrary>) -> (LayoutGeometry, RgbaImage) {
        let catalog = FormatCatalog::builtin().unwrap();
        let format = catalog.get("sklik-300x250").unwrap();
        let overlay = TextOverlaySpec {
            headline: "Black Friday".into(),
            headline_color: Some(Color::WHITE),
            ..Default::default()
        };
        let geometry = TextLayoutEngine::new(Arc::new(FontMeasurer::new(fonts.clone(), brand.font_family.clone())))
            .layout(&LayoutInput {
                size: format.size(),
                overlay: &overlay,
                format_override: None,
                brand,
                logo_aspect: None,
            });
        let inputs = RasterInputs { background_color: Color::BLACK, ..Default::default() };
        let artifact = RasterComposer::new(fonts, 90, true, false).compose(format, &geometry, &inputs).unwrap();
        assert_eq!(artifact.format, RasterFormat::Png);
        let image = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        (geometry, image)
    }

    fn bright_pixels(image: &RgbaImage, rect: Rect) -> Vec<(u32, u32)> {
        let x1 = (rect.right().ceil() as u32).min(image.width());
        let y1 = (rect.bottom().ceil() as u32).min(image.height());
        let mut hits = Vec::new();
        for y in rect.y.max(0.0) as u32..y1 {
            for x in rect.x.max(0.0) as u32..x1 {
                if image.get_pixel(x, y).0[..3].iter().all(|&c| c > 160) {
                    hits.push((x, y));
                }
            }
        }
        hits
    }

    #[test]
    fn default_brand_font_draws_text_without_arial() {
        let brand = BrandKit::default();
        let fonts = fonts();
        assert!(fonts.resolve("Arial", FontWeight::Bold).is_none());

        let (geometry, image) = render_headline(&brand, fonts);
        assert!(geometry.headline.visible);
        let line = &geometry.headline.lines[0];
        let rect = Rect::new(line.x, line.y, line.width, geometry.headline.line_height);
        assert!(bright_pixels(&image, rect).len() > 100);
    }

    #[test]
    fn unknown_family_still_draws_text() {
        let brand = BrandKit { font_family: "Brand Grotesk".into(), ..Default::default() };
        let (geometry, image) = render_headline(&brand, fonts());
        let line = &geometry.headline.lines[0];
        let rect = Rect::new(line.x, line.y, line.width, geometry.headline.line_height);
        assert!(bright_pixels(&image, rect).len() > 100);
    }

    #[test]
    fn ink_stays_inside_measured_line() {
        let (geometry, image) = render_headline(&BrandKit::default(), fonts());
        let line = &geometry.headline.lines[0];
        let full = Rect::new(0.0, line.y, image.width() as f32, geometry.headline.line_height);
        let hits = bright_pixels(&image, full);
        let left = hits.iter().map(|p| p.0).min().unwrap() as f32;
        let right = hits.iter().map(|p| p.0).max().unwrap() as f32 + 1.0;
        assert!(left >= line.x - 2.0, "ink starts at {left}, line at {}", line.x);
        assert!(right <= line.x + line.width + 2.0, "ink ends at {right}, line ends at {}", line.x + line.width);
        // measured advance and drawn ink agree to within a few pixels
        assert!(right - left >= line.width * 0.85);
    }

    #[test]
    fn luminance_of_region() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        for x in 5..10 {
            for y in 0..10 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let bright = region_luminance(&img, &Rect::new(5.0, 0.0, 5.0, 10.0)).unwrap();
        let dark = region_luminance(&img, &Rect::new(0.0, 0.0, 5.0, 10.0)).unwrap();
        assert!(bright > 0.99);
        assert!(dark < 0.01);
        assert!(region_luminance(&img, &Rect::new(20.0, 20.0, 5.0, 5.0)).is_none());
    }
}
