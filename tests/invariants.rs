//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use bannerforge_core::{
    export::{SKLIK_CSV_FILE, MANIFEST_FILE},
    hashing::canonical_json,
    layout::band::CTA_MIN,
    EngineConfig, ExportJob, ExportManifest, ExportPipeline, FontSizeTier, FormatCatalog,
    SourceImage, ViolationSeverity,
};

fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Sky, sun and a textured horizon with mild sensor noise, roughly what a
/// product photo looks like to the encoder and the luminance sampler.
fn photo_source() -> Vec<u8> {
    let (w, h) = (640u32, 480u32);
    let mut state: u32 = 0x9e37_79b9;
    let img = RgbaImage::from_fn(w, h, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let grain = (state % 25) as f32 - 12.0;
        let (fx, fy) = (x as f32 / w as f32, y as f32 / h as f32);
        let base = if fy < 0.6 {
            [90.0 + 120.0 * fy, 140.0 + 80.0 * fy, 230.0 - 40.0 * fy]
        } else {
            let ripple = ((fx * 40.0).sin() * (fy * 25.0).cos()) * 18.0;
            [110.0 + ripple, 90.0 + ripple * 0.8, 60.0 + ripple * 0.5]
        };
        let sun = ((fx - 0.72).powi(2) + (fy - 0.25).powi(2)).sqrt();
        let glow = (1.0 - sun / 0.12).clamp(0.0, 1.0) * 160.0;
        let px = base.map(|c| (c + glow + grain).clamp(0.0, 255.0) as u8);
        Rgba([px[0], px[1], px[2], 255])
    });
    encode_png(&img)
}

/// High-entropy pixels so the JPEG encoder cannot compress well.
fn noisy_source() -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img = RgbaImage::from_fn(600, 500, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    encode_png(&img)
}

fn base64_source(bytes: &[u8]) -> SourceImage {
    SourceImage::Base64 { data: base64::engine::general_purpose::STANDARD.encode(bytes) }
}

fn job(formats: &[&str]) -> ExportJob {
    let mut job = ExportJob::new(base64_source(&photo_source()));
    job.formats = formats.iter().map(|s| s.to_string()).collect();
    job.overlay.headline = "Black Friday Sleva 50%".to_string();
    job.overlay.subheadline = "Jen do nedele".to_string();
    job.overlay.cta = "Nakoupit".to_string();
    job.overlay.font_size_tier = FontSizeTier::Medium;
    job
}

fn pipeline() -> ExportPipeline {
    ExportPipeline::new(FormatCatalog::builtin().unwrap(), EngineConfig::default()).unwrap()
}

fn single_format_catalog(max_size_kb: u32) -> FormatCatalog {
    let json = format!(
        r#"{{
            "version": "test",
            "engineMinVersion": "1.0.0",
            "platforms": {{
                "sklik": {{
                    "name": "Sklik",
                    "categories": {{
                        "banners": {{
                            "name": "Banners",
                            "type": "image",
                            "maxSizeKB": {},
                            "fileTypes": ["jpg", "png"],
                            "formats": [
                                {{ "id": "sklik-300x250", "name": "Medium Rectangle", "width": 300, "height": 250 }}
                            ]
                        }}
                    }}
                }}
            }}
        }}"#,
        max_size_kb
    );
    FormatCatalog::from_json(&json).unwrap()
}

#[test]
fn invariant_medium_rectangle_renders_valid() {
    let report = pipeline().run(&job(&["sklik-300x250"]), None).unwrap();

    let result = &report.results[0];
    assert_eq!(result.format_id, "sklik-300x250");
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
    let size_kb = result.file_size_kb.unwrap();
    assert!(size_kb > 0.0 && size_kb <= 150.0);

    let entry = report.deliverable.manifest.entry("sklik-300x250").unwrap();
    assert_eq!(entry.width, 300);
    assert_eq!(entry.height, 250);
    assert!(report.deliverable.file(&entry.output_path).is_some());
}

#[test]
fn invariant_safe_zone_formats_warn_with_description() {
    let catalog = FormatCatalog::builtin().unwrap();
    let description = catalog
        .get("sklik-970x310")
        .and_then(|f| f.safe_zone.as_ref())
        .map(|z| z.description.clone())
        .unwrap();

    let report = pipeline().run(&job(&["sklik-970x310"]), None).unwrap();
    let result = &report.results[0];

    assert!(result.valid);
    assert!(result.has_warnings());
    assert!(result.warnings.iter().any(|w| w.contains(&description)));
    assert!(result
        .violations
        .iter()
        .any(|v| v.rule == "safe_zone" && v.severity == ViolationSeverity::Warning));
}

#[test]
fn invariant_very_small_format_stays_legible() {
    let j = job(&["sklik-320x50"]);
    let geometry = pipeline().layout_for("sklik-320x50", &j).unwrap();

    assert!(geometry.single_row);
    assert!(!geometry.subheadline.visible);
    assert!(!geometry.cta.visible || geometry.cta.font_size >= CTA_MIN);
    for line in &geometry.headline.lines {
        assert!(line.x >= 0.0);
        assert!(line.x + line.width <= geometry.width as f32 + 0.5);
    }

    let report = pipeline().run(&j, None).unwrap();
    assert!(report.all_valid());
}

#[test]
fn invariant_broken_format_does_not_abort_batch() {
    let mut j = job(&["sklik-300x250", "sklik-728x90", "sklik-160x600"]);
    j.source_overrides.insert("sklik-728x90".to_string(), base64_source(b"definitely not a png"));

    let report = pipeline().run(&j, None).unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.summary().total, 3);
    assert_eq!(report.summary().error, 1);

    let broken = report.results.iter().find(|r| r.format_id == "sklik-728x90").unwrap();
    assert!(!broken.valid);
    assert!(!broken.errors.is_empty());

    let manifest: ExportManifest =
        serde_json::from_slice(&report.deliverable.file(MANIFEST_FILE).unwrap().bytes).unwrap();
    assert_eq!(manifest.entries.len(), 2);
    assert!(manifest.entry("sklik-728x90").is_none());
    assert_eq!(manifest.excluded.len(), 1);

    let csv = String::from_utf8(report.deliverable.file(SKLIK_CSV_FILE).unwrap().bytes.clone()).unwrap();
    // header + two rows
    assert_eq!(csv.lines().count(), 3);
    assert!(!csv.contains("728x90"));
}

#[test]
fn invariant_cancelled_batch_reports_cancellation_not_errors() {
    let p = pipeline();
    p.cancel_handle().store(true, std::sync::atomic::Ordering::SeqCst);
    let report = p.run(&job(&["sklik-300x250", "sklik-728x90"]), None).unwrap();

    let summary = report.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.error, 0);
    assert!(report.all_valid());
    assert!(report.results.iter().all(|r| r.errors.is_empty()));

    let manifest: ExportManifest =
        serde_json::from_slice(&report.deliverable.file(MANIFEST_FILE).unwrap().bytes).unwrap();
    assert!(manifest.entries.is_empty());
    assert!(manifest.excluded.iter().all(|e| e.reason == "cancelled"));
    assert_eq!(manifest.summary.cancelled, 2);
}

#[test]
fn invariant_headline_pixels_are_drawn_with_default_brand() {
    use bannerforge_core::raster::{RasterFormat, RasterInputs};
    use bannerforge_core::{Color, FontLibrary, FontMeasurer, LayoutInput, RasterComposer, TextLayoutEngine};
    use std::sync::Arc;

    let catalog = FormatCatalog::builtin().unwrap();
    let format = catalog.get("sklik-300x250").unwrap();
    let mut j = job(&[]);
    j.overlay.headline_color = Some(Color::WHITE);
    j.overlay.subheadline.clear();
    j.overlay.cta.clear();

    let fonts = Arc::new(FontLibrary::embedded());
    let engine = TextLayoutEngine::new(Arc::new(FontMeasurer::new(fonts.clone(), j.brand.font_family.clone())));
    let geometry = engine.layout(&LayoutInput {
        size: format.size(),
        overlay: &j.overlay,
        format_override: None,
        brand: &j.brand,
        logo_aspect: None,
    });
    let artifact = RasterComposer::new(fonts, 90, true, false)
        .compose(format, &geometry, &RasterInputs { background_color: Color::BLACK, ..Default::default() })
        .unwrap();
    assert_eq!(artifact.format, RasterFormat::Png);
    let image = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();

    let mut bright = 0;
    for line in &geometry.headline.lines {
        let (x0, y0) = (line.x.max(0.0) as u32, line.y.max(0.0) as u32);
        let x1 = ((line.x + line.width).ceil() as u32).min(image.width());
        let y1 = ((line.y + geometry.headline.line_height).ceil() as u32).min(image.height());
        for y in y0..y1 {
            for x in x0..x1 {
                if image.get_pixel(x, y).0[..3].iter().all(|&c| c > 160) {
                    bright += 1;
                }
            }
        }
    }
    assert!(bright > 200, "only {bright} text pixels drawn");
}

#[test]
fn invariant_manifest_hash_is_deterministic() {
    let j = job(&["sklik-300x250", "google-html5-300x250"]);
    let a = pipeline().run(&j, None).unwrap();
    let b = pipeline().run(&j, None).unwrap();

    let (ma, mb) = (&a.deliverable.manifest, &b.deliverable.manifest);
    assert_ne!(ma.export_id, mb.export_id);
    assert_eq!(ma.manifest_hash, mb.manifest_hash);
    for (ea, eb) in ma.entries.iter().zip(&mb.entries) {
        assert_eq!(ea.content_hash, eb.content_hash);
    }
}

#[test]
fn invariant_raster_invalid_only_over_size_limit() {
    let mut j = job(&["sklik-300x250"]);
    j.source = base64_source(&noisy_source());

    let roomy = ExportPipeline::new(single_format_catalog(10_000), EngineConfig::default()).unwrap();
    let report = roomy.run(&j, None).unwrap();
    assert!(report.all_valid());
    let size_kb = report.results[0].file_size_kb.unwrap();
    assert!(size_kb > 1.0);

    let tight = ExportPipeline::new(single_format_catalog(1), EngineConfig::default()).unwrap();
    let report = tight.run(&j, None).unwrap();
    let result = &report.results[0];
    assert!(!result.valid);
    assert!(result
        .violations
        .iter()
        .filter(|v| v.severity == ViolationSeverity::Error)
        .all(|v| v.rule == "file_size"));
    assert!(report.deliverable.manifest.entries.is_empty());
}

#[test]
fn invariant_canonical_json_is_order_independent() {
    use serde_json::json;

    let obj1 = json!({"z": 1, "a": 2, "m": {"b": 1, "a": 2}});
    let obj2 = json!({"a": 2, "m": {"a": 2, "b": 1}, "z": 1});

    assert_eq!(canonical_json(&obj1).unwrap(), canonical_json(&obj2).unwrap());
}

#[test]
fn invariant_unknown_format_is_job_error() {
    let err = pipeline().run(&job(&["sklik-1x1"]), None).unwrap_err();
    assert!(err.to_string().contains("sklik-1x1"));
}
