//! Export Pipeline - Single Entry Point
//!
//! Every rendered format goes through `Validator` before it reaches the
//! packager. Per-format failures become validation errors; only job-level
//! problems (unknown format, missing provider, bad config) abort the batch.

use base64::Engine;
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::brand::{BrandKit, LogoImage, LogoVariant, LogoVariants};
use crate::catalog::{FormatCatalog, FormatId, FormatSpec};
use crate::config::EngineConfig;
use crate::crop::{decode_image, sample_cover, DecodedImage};
use crate::error::{EngineError, EngineResult};
use crate::fonts::{FontLibrary, FontMeasurer, FALLBACK_FAMILY};
use crate::export::{AdCopy, CsvOptions, Deliverable, ExportPackager, FormatOutcome, RenderArtifact};
use crate::hashing::{compute_content_hash, sha256_hex};
use crate::html5::{Html5Artifact, Html5Composer, Html5Inputs};
use crate::layout::{place_logo, FontWeight, LayoutGeometry, LayoutInput, TextLayoutEngine, TextMeasurer};
use crate::overlay::{CropMode, CropSpec, FormatOverride, TextOverlaySpec};
use crate::providers::{self, ImageGenerationProvider, SmartCropProvider};
use crate::raster::{encode, region_luminance, RasterComposer, RasterFormat, RasterInputs};
use crate::validation::{ValidationInput, ValidationResult, ValidationSummary, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::AtomicU32;

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

pub const CANCELLED: &str = "cancelled";

/// Where the creative's background comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SourceImage {
    Path { path: PathBuf },
    Base64 { data: String },
    Generate { prompt: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub source: SourceImage,
    #[serde(default)]
    pub brand: BrandKit,
    #[serde(default)]
    pub overlay: TextOverlaySpec,
    #[serde(default)]
    pub crop_mode: CropMode,
    /// Empty selects every non-video format.
    #[serde(default)]
    pub formats: Vec<FormatId>,
    #[serde(default)]
    pub format_overrides: BTreeMap<FormatId, FormatOverride>,
    #[serde(default)]
    pub crop_overrides: BTreeMap<FormatId, CropMode>,
    #[serde(default)]
    pub source_overrides: BTreeMap<FormatId, SourceImage>,
    #[serde(default)]
    pub csv: CsvOptions,
    /// CSV description; the subheadline when absent.
    #[serde(default)]
    pub description: Option<String>,
}

impl ExportJob {
    pub fn new(source: SourceImage) -> Self {
        Self {
            source,
            brand: BrandKit::default(),
            overlay: TextOverlaySpec::default(),
            crop_mode: CropMode::default(),
            formats: Vec::new(),
            format_overrides: BTreeMap::new(),
            crop_overrides: BTreeMap::new(),
            source_overrides: BTreeMap::new(),
            csv: CsvOptions::default(),
            description: None,
        }
    }

    pub fn load_from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut job: ExportJob = serde_json::from_str(&content)?;
        // Relative source paths are relative to the job file.
        if let Some(base) = path.parent() {
            job.source = rebase(job.source, base);
            job.source_overrides = std::mem::take(&mut job.source_overrides)
                .into_iter()
                .map(|(id, source)| (id, rebase(source, base)))
                .collect();
        }
        Ok(job)
    }

    fn ad_copy(&self) -> AdCopy {
        AdCopy {
            headline: self.overlay.headline.clone(),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| self.overlay.subheadline.clone()),
        }
    }

    fn needs_smart_crop(&self) -> bool {
        matches!(self.crop_mode, CropMode::Smart { .. })
            || self.crop_overrides.values().any(|m| matches!(m, CropMode::Smart { .. }))
    }

    fn needs_generator(&self) -> bool {
        matches!(self.source, SourceImage::Generate { .. })
            || self.source_overrides.values().any(|s| matches!(s, SourceImage::Generate { .. }))
    }
}

fn rebase(source: SourceImage, base: &Path) -> SourceImage {
    match source {
        SourceImage::Path { path } if path.is_relative() => SourceImage::Path { path: base.join(path) },
        other => other,
    }
}

/// Deliverable plus every format's validation, ordered by format id.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub deliverable: Deliverable,
    pub results: Vec<ValidationResult>,
}

impl ExportReport {
    pub fn summary(&self) -> &ValidationSummary {
        &self.deliverable.manifest.summary
    }

    /// Every format that ran is valid. Cancelled formats do not count.
    pub fn all_valid(&self) -> bool {
        self.results.iter().all(|r| r.valid || r.cancelled)
    }

    pub fn cancelled(&self) -> bool {
        self.results.iter().any(|r| r.cancelled)
    }
}

/// `(current, total, format_id)` after each format finishes.
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + Sync + 'a;

/// A decoded source together with the hash of its encoded bytes.
#[derive(Debug, Clone)]
struct LoadedSource {
    image: DecodedImage,
    hash: String,
}

type SourceResult = Result<LoadedSource, String>;

/// Logos that decoded, with their pixels. `usable` drives variant selection.
#[derive(Debug, Clone, Default)]
struct DecodedLogos {
    usable: LogoVariants,
    main: Option<Arc<RgbaImage>>,
    light: Option<Arc<RgbaImage>>,
    dark: Option<Arc<RgbaImage>>,
}

impl DecodedLogos {
    fn decode(brand: &BrandKit) -> Self {
        if !brand.applies_logo() {
            return Self::default();
        }
        let mut usable = LogoVariants::default();
        let mut decode = |variant: LogoVariant, logo: Option<&LogoImage>| {
            let logo = logo?;
            match image::load_from_memory(&logo.0) {
                Ok(img) => {
                    let slot = match variant {
                        LogoVariant::Main => &mut usable.main,
                        LogoVariant::Light => &mut usable.light,
                        LogoVariant::Dark => &mut usable.dark,
                    };
                    *slot = Some(logo.clone());
                    Some(Arc::new(img.to_rgba8()))
                }
                Err(e) => {
                    tracing::warn!(variant = ?variant, error = %e, "logo could not be decoded, skipping");
                    None
                }
            }
        };
        let main = decode(LogoVariant::Main, brand.logos.main.as_ref());
        let light = decode(LogoVariant::Light, brand.logos.light.as_ref());
        let dark = decode(LogoVariant::Dark, brand.logos.dark.as_ref());
        Self { usable, main, light, dark }
    }

    fn get(&self, variant: LogoVariant) -> Option<&Arc<RgbaImage>> {
        match variant {
            LogoVariant::Main => self.main.as_ref(),
            LogoVariant::Light => self.light.as_ref(),
            LogoVariant::Dark => self.dark.as_ref(),
        }
    }

    fn select(&self, auto_select: bool, luminance: Option<f32>) -> Option<(LogoVariant, &Arc<RgbaImage>)> {
        let (variant, _) = self.usable.select(auto_select, luminance)?;
        self.get(variant).map(|img| (variant, img))
    }
}

fn aspect_of(image: &RgbaImage) -> f32 {
    image.width() as f32 / image.height().max(1) as f32
}

/// Inputs covered by a format's content hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentInputs<'a> {
    brand: &'a BrandKit,
    overlay: &'a TextOverlaySpec,
    format_override: Option<&'a FormatOverride>,
    crop: &'a CropMode,
    format: &'a FormatSpec,
    config: &'a EngineConfig,
}

/// Intermediate products of one successful render.
struct Rendered {
    artifact: RenderArtifact,
    companion_html5: Option<Html5Artifact>,
    geometry: LayoutGeometry,
}

pub struct ExportPipeline {
    catalog: FormatCatalog,
    config: EngineConfig,
    fonts: Arc<FontLibrary>,
    measurer: Option<Arc<dyn TextMeasurer>>,
    raster: RasterComposer,
    html5: Html5Composer,
    validator: Validator,
    smart_crop: Option<Arc<dyn SmartCropProvider>>,
    generator: Option<Arc<dyn ImageGenerationProvider>>,
    cancel: Arc<AtomicBool>,
}

impl ExportPipeline {
    pub fn new(catalog: FormatCatalog, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let fonts = Arc::new(FontLibrary::new(config.system_fonts, &config.font_dirs));
        let raster = RasterComposer::new(
            fonts.clone(),
            config.jpeg_quality,
            config.prefer_png,
            config.debug_safe_zone,
        );
        let html5 = Html5Composer::new(config.html5.clone());
        Ok(Self {
            catalog,
            config,
            fonts,
            measurer: None,
            raster,
            html5,
            validator: Validator::new(),
            smart_crop: None,
            generator: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_smart_crop(mut self, provider: Arc<dyn SmartCropProvider>) -> Self {
        self.smart_crop = Some(provider);
        self
    }

    pub fn with_image_generator(mut self, provider: Arc<dyn ImageGenerationProvider>) -> Self {
        self.generator = Some(provider);
        self
    }

    /// Replaces the font-backed measurer for every brand.
    pub fn with_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.measurer = Some(measurer);
        self
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared flag; setting it skips every format not yet started.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Geometry for one format, without any rendering.
    pub fn layout_for(&self, format_id: &str, job: &ExportJob) -> EngineResult<LayoutGeometry> {
        let format = self
            .catalog
            .get(format_id)
            .ok_or_else(|| EngineError::FormatNotFound(format_id.to_string()))?;
        let logos = DecodedLogos::decode(&job.brand);
        let aspect = logos
            .select(false, None)
            .map(|(_, img)| aspect_of(img));
        let layout = self.layout_engine(&job.brand);
        Ok(self.layout(&layout, &LayoutInput {
            size: format.size(),
            overlay: &job.overlay,
            format_override: job.format_overrides.get(format_id),
            brand: &job.brand,
            logo_aspect: aspect,
        }))
    }

    /// Layout engine measuring in the brand's font.
    fn layout_engine(&self, brand: &BrandKit) -> TextLayoutEngine {
        match &self.measurer {
            Some(measurer) => TextLayoutEngine::new(measurer.clone()),
            None => TextLayoutEngine::new(Arc::new(FontMeasurer::new(self.fonts.clone(), brand.font_family.clone()))),
        }
    }

    fn layout(&self, engine: &TextLayoutEngine, input: &LayoutInput<'_>) -> LayoutGeometry {
        let mut geometry = engine.layout(input);
        if self.fonts.resolve(&input.brand.font_family, FontWeight::Regular).is_none() {
            geometry.notes.push(format!(
                "Font '{}' is not installed; text rendered in {}",
                input.brand.font_family, FALLBACK_FAMILY
            ));
        }
        geometry
    }

    /// Render, validate and package every selected format.
    #[tracing::instrument(skip_all, fields(workers = self.config.workers))]
    pub fn run(&self, job: &ExportJob, progress: Option<&ProgressFn<'_>>) -> EngineResult<ExportReport> {
        let formats = self.catalog.select(&job.formats)?;
        if job.needs_smart_crop() && self.smart_crop.is_none() {
            return Err(providers::missing("smart-crop"));
        }
        if job.needs_generator() && self.generator.is_none() {
            return Err(providers::missing("image generation"));
        }
        tracing::info!(formats = formats.len(), catalog = %self.catalog.version(), "export started");

        let renderable: Vec<&FormatSpec> = formats.iter().filter(|f| !f.is_video).collect();
        let main_size = renderable.iter().fold((1, 1), |(w, h), f| (w.max(f.width), h.max(f.height)));
        let main_source = self.load_source(&job.source, main_size);
        if let Err(reason) = &main_source {
            tracing::warn!(%reason, "main source unavailable, every format without an override will fail");
        }
        let logos = DecodedLogos::decode(&job.brand);
        let layout = self.layout_engine(&job.brand);

        let pool = build_thread_pool(self.config.workers)?;
        let total = formats.len();
        let done = AtomicUsize::new(0);
        let outcomes: Vec<FormatOutcome> = pool.install(|| {
            formats
                .par_iter()
                .map(|format| {
                    let outcome = self.render_format(format, job, &main_source, &logos, &layout);
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(report) = progress {
                        report(current, total, &format.id);
                    }
                    outcome
                })
                .collect()
        });

        let packager = ExportPackager::new(self.config.failure_policy, job.csv.clone(), self.catalog.version());
        let deliverable = packager.package(&outcomes, &job.ad_copy())?;
        let results = outcomes.into_iter().map(|o| o.validation).collect();
        tracing::info!(
            ok = deliverable.manifest.summary.ok,
            warning = deliverable.manifest.summary.warning,
            error = deliverable.manifest.summary.error,
            cancelled = deliverable.manifest.summary.cancelled,
            "export finished"
        );
        Ok(ExportReport { deliverable, results })
    }

    /// One isolated unit of work. Never fails: problems land in the outcome.
    #[tracing::instrument(skip_all, fields(format = %format.id))]
    fn render_format(
        &self,
        format: &FormatSpec,
        job: &ExportJob,
        main_source: &SourceResult,
        logos: &DecodedLogos,
        layout: &TextLayoutEngine,
    ) -> FormatOutcome {
        if self.cancel.load(Ordering::SeqCst) {
            tracing::debug!("cancelled before start");
            return FormatOutcome {
                format: format.clone(),
                artifact: None,
                companion_html5: None,
                validation: ValidationResult::cancelled(&format.id),
                content_hash: String::new(),
                failure: Some(CANCELLED.to_string()),
            };
        }
        if format.is_video {
            return self.failed(format, "render", "video formats are not rendered", String::new());
        }

        let override_source;
        let source = match job.source_overrides.get(&format.id) {
            Some(source) => {
                override_source = self.load_source(source, (format.width, format.height));
                &override_source
            }
            None => main_source,
        };
        let source = match source {
            Ok(source) => source,
            Err(reason) => return self.failed(format, "source", reason, String::new()),
        };

        let crop_mode = job.crop_overrides.get(&format.id).unwrap_or(&job.crop_mode);
        let format_override = job.format_overrides.get(&format.id);
        let content_hash = compute_content_hash(
            &format.id,
            &source.hash,
            &ContentInputs {
                brand: &job.brand,
                overlay: &job.overlay,
                format_override,
                crop: crop_mode,
                format,
                config: &self.config,
            },
            ENGINE_VERSION,
        );
        let content_hash = match content_hash {
            Ok(hash) => hash,
            Err(e) => return self.failed(format, "content_hash", &e.to_string(), String::new()),
        };

        match self.render(format, job, source, crop_mode, format_override, logos, layout) {
            Ok(rendered) => {
                let validation = self.validate(&ValidationInput {
                    format,
                    artifact: Some(rendered.artifact.view()),
                    geometry: Some(&rendered.geometry),
                });
                tracing::debug!(valid = validation.valid, size_kb = ?validation.file_size_kb, "format validated");
                FormatOutcome {
                    format: format.clone(),
                    artifact: Some(rendered.artifact),
                    companion_html5: rendered.companion_html5,
                    validation,
                    content_hash,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "format failed");
                self.failed(format, "render", &e.to_string(), content_hash)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        format: &FormatSpec,
        job: &ExportJob,
        source: &LoadedSource,
        crop_mode: &CropMode,
        format_override: Option<&FormatOverride>,
        logos: &DecodedLogos,
        layout: &TextLayoutEngine,
    ) -> EngineResult<Rendered> {
        let size = format.size();
        let crop: CropSpec = match crop_mode {
            CropMode::Manual(spec) => spec.normalized(),
            CropMode::Smart { zoom } => {
                let provider = self.smart_crop.as_ref().ok_or_else(|| providers::missing("smart-crop"))?;
                provider.detect_focus(&source.image, size)?.as_crop(*zoom)
            }
        };
        let background = sample_cover(&source.image, size, &crop)?;

        // Placement from the fallback variant, then the variant that suits
        // the pixels under it.
        let rules = &job.brand.logo_rules;
        let logo = logos.select(false, None).and_then(|(_, fallback)| {
            let placement = place_logo(size, rules, aspect_of(fallback));
            let luminance = region_luminance(&background, &placement.rect);
            logos.select(rules.auto_select_variant, luminance)
        });
        if let Some((variant, _)) = &logo {
            tracing::debug!(variant = ?variant, "logo variant selected");
        }

        let geometry = self.layout(layout, &LayoutInput {
            size,
            overlay: &job.overlay,
            format_override,
            brand: &job.brand,
            logo_aspect: logo.map(|(_, img)| aspect_of(img)),
        });

        let logo_image = logo.map(|(_, img)| img.as_ref());
        if format.is_html5() {
            let html5 = self.compose_html5(format, &geometry, &job.brand, &background, logo_image)?;
            return Ok(Rendered { artifact: RenderArtifact::Html5(html5), companion_html5: None, geometry });
        }

        let raster = self.raster.compose(
            format,
            &geometry,
            &RasterInputs {
                background: Some(&background),
                logo: logo_image,
                background_color: job.brand.primary_color,
                default_shadow: self.config.default_shadow,
            },
        )?;
        let companion_html5 = if self.config.emit_html5_for_raster {
            Some(self.compose_html5(format, &geometry, &job.brand, &background, logo_image)?)
        } else {
            None
        };
        Ok(Rendered { artifact: RenderArtifact::Raster(raster), companion_html5, geometry })
    }

    fn compose_html5(
        &self,
        format: &FormatSpec,
        geometry: &LayoutGeometry,
        brand: &BrandKit,
        background: &RgbaImage,
        logo: Option<&RgbaImage>,
    ) -> EngineResult<Html5Artifact> {
        let background = encode(background, RasterFormat::Jpeg, self.config.jpeg_quality)?;
        let logo = match logo {
            Some(img) => Some(("logo.png".to_string(), encode(img, RasterFormat::Png, self.config.jpeg_quality)?)),
            None => None,
        };
        Ok(self.html5.compose(
            format,
            geometry,
            &Html5Inputs {
                background_color: brand.primary_color,
                background: Some(("background.jpg".to_string(), background)),
                logo,
                default_shadow: self.config.default_shadow,
            },
        ))
    }

    /// The only validation entry point.
    fn validate(&self, input: &ValidationInput<'_>) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(input)
    }

    fn failed(&self, format: &FormatSpec, rule: &str, reason: &str, content_hash: String) -> FormatOutcome {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        FormatOutcome {
            format: format.clone(),
            artifact: None,
            companion_html5: None,
            validation: self.validator.validate_failure(format, rule, reason),
            content_hash,
            failure: Some(reason.to_string()),
        }
    }

    fn load_source(&self, source: &SourceImage, size: (u32, u32)) -> SourceResult {
        let bytes = match source {
            SourceImage::Path { path } => {
                fs::read(path).map_err(|e| format!("Source image {} could not be read: {}", path.display(), e))?
            }
            SourceImage::Base64 { data } => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| format!("Source image is not valid base64: {}", e))?,
            SourceImage::Generate { prompt } => {
                let generator = self
                    .generator
                    .as_ref()
                    .ok_or_else(|| providers::missing("image generation").to_string())?;
                generator
                    .generate(prompt, size.0, size.1)
                    .map_err(|e| e.to_string())?
            }
        };
        let image = decode_image(&bytes).map_err(|e| e.to_string())?;
        Ok(LoadedSource { image, hash: sha256_hex(&bytes) })
    }
}

fn build_thread_pool(workers: usize) -> EngineResult<rayon::ThreadPool> {
    if workers == 0 {
        return Err(EngineError::Config("workers must be >= 1".to_string()));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EngineError::Config(format!("failed to build rayon thread pool: {e}")))
}
