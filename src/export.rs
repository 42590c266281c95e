//! Export Packager
//!
//! Turns per-format outcomes into an ordered file list plus `manifest.json`
//! and the platform CSV import files. Nothing touches the filesystem until
//! `Deliverable::write_to_dir`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::catalog::{FormatId, FormatSpec};
use crate::error::EngineResult;
use crate::hashing::compute_manifest_hash;
use crate::html5::Html5Artifact;
use crate::raster::RasterArtifact;
use crate::validation::{ArtifactRef, ValidationResult, ValidationSummary};
use crate::ENGINE_VERSION;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SKLIK_CSV_FILE: &str = "sklik-import.csv";
pub const GOOGLE_CSV_FILE: &str = "google-ads-import.csv";

/// What happens to formats whose validation has errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    #[default]
    Exclude,
    /// Package rendered-but-invalid formats with their errors attached.
    IncludeWithDiagnostics,
}

#[derive(Debug, Clone)]
pub enum RenderArtifact {
    Raster(RasterArtifact),
    Html5(Html5Artifact),
}

impl RenderArtifact {
    pub fn view(&self) -> ArtifactRef<'_> {
        match self {
            RenderArtifact::Raster(r) => ArtifactRef::Raster(r),
            RenderArtifact::Html5(h) => ArtifactRef::Html5(h),
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            RenderArtifact::Raster(_) => "image",
            RenderArtifact::Html5(_) => "html5",
        }
    }

    pub fn size_kb(&self) -> f64 {
        match self {
            RenderArtifact::Raster(r) => r.size_kb(),
            RenderArtifact::Html5(h) => h.total_kb(),
        }
    }
}

/// Everything the pipeline produced for one format.
#[derive(Debug, Clone)]
pub struct FormatOutcome {
    pub format: FormatSpec,
    /// `None` when the format could not be rendered.
    pub artifact: Option<RenderArtifact>,
    /// HTML5 version of a raster format, when requested.
    pub companion_html5: Option<Html5Artifact>,
    pub validation: ValidationResult,
    pub content_hash: String,
    /// Why the format has no artifact.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub format_id: FormatId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub platform: String,
    pub category: String,
    pub output_path: String,
    #[serde(rename = "fileSizeKB")]
    pub file_size_kb: f64,
    pub content_hash: String,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html5_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedEntry {
    pub format_id: FormatId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub export_id: String,
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub catalog_version: String,
    pub failure_policy: FailurePolicy,
    pub entries: Vec<ManifestEntry>,
    pub excluded: Vec<ExcludedEntry>,
    pub summary: ValidationSummary,
    pub manifest_hash: String,
}

/// Manifest fields covered by the hash; id and timestamp are left out so
/// identical inputs hash identically.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedManifest<'a> {
    engine_version: &'a str,
    catalog_version: &'a str,
    failure_policy: FailurePolicy,
    entries: &'a [ManifestEntry],
    excluded: &'a [ExcludedEntry],
    summary: &'a ValidationSummary,
}

impl ExportManifest {
    pub fn compute_hash(&self) -> EngineResult<String> {
        Ok(compute_manifest_hash(&HashedManifest {
            engine_version: &self.engine_version,
            catalog_version: &self.catalog_version,
            failure_policy: self.failure_policy,
            entries: &self.entries,
            excluded: &self.excluded,
            summary: &self.summary,
        })?)
    }

    pub fn entry(&self, format_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.format_id == format_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_campaign")]
    pub campaign: String,
    #[serde(default = "default_ad_group")]
    pub ad_group: String,
    #[serde(default)]
    pub final_url: String,
}

fn default_true() -> bool { true }
fn default_campaign() -> String { "Campaign".to_string() }
fn default_ad_group() -> String { "Ad group 1".to_string() }

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            campaign: default_campaign(),
            ad_group: default_ad_group(),
            final_url: String::new(),
        }
    }
}

/// Ad copy written into CSV rows.
#[derive(Debug, Clone, Default)]
pub struct AdCopy {
    pub headline: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverableFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Deliverable {
    pub files: Vec<DeliverableFile>,
    pub manifest: ExportManifest,
}

impl Deliverable {
    pub fn file(&self, path: &str) -> Option<&DeliverableFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes.len() as u64).sum()
    }

    #[tracing::instrument(skip(self), fields(files = self.files.len()))]
    pub fn write_to_dir(&self, root: &Path) -> EngineResult<()> {
        for file in &self.files {
            let target = root.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.bytes)?;
        }
        tracing::info!(root = %root.display(), bytes = self.total_bytes(), "deliverable written");
        Ok(())
    }
}

pub struct ExportPackager {
    policy: FailurePolicy,
    csv: CsvOptions,
    catalog_version: String,
}

impl ExportPackager {
    pub fn new(policy: FailurePolicy, csv: CsvOptions, catalog_version: impl Into<String>) -> Self {
        Self {
            policy,
            csv,
            catalog_version: catalog_version.into(),
        }
    }

    /// Package `outcomes` in format-id order.
    #[tracing::instrument(skip_all, fields(formats = outcomes.len()))]
    pub fn package(&self, outcomes: &[FormatOutcome], copy: &AdCopy) -> EngineResult<Deliverable> {
        let mut ordered: Vec<&FormatOutcome> = outcomes.iter().collect();
        ordered.sort_by(|a, b| a.format.id.cmp(&b.format.id));

        let mut files = Vec::new();
        let mut entries = Vec::new();
        let mut excluded = Vec::new();
        let mut used = HashSet::new();

        for outcome in &ordered {
            let artifact = match (&outcome.artifact, &outcome.failure) {
                (Some(artifact), None) => artifact,
                (_, failure) => {
                    let reason = failure
                        .clone()
                        .or_else(|| outcome.validation.errors.first().cloned())
                        .unwrap_or_else(|| "not rendered".to_string());
                    excluded.push(ExcludedEntry { format_id: outcome.format.id.clone(), reason });
                    continue;
                }
            };
            if !outcome.validation.valid && self.policy == FailurePolicy::Exclude {
                excluded.push(ExcludedEntry {
                    format_id: outcome.format.id.clone(),
                    reason: outcome.validation.errors.join("; "),
                });
                continue;
            }

            let format = &outcome.format;
            let stem = unique_stem(&mut used, format);
            let dir = format!("{}/{}", format.platform_id, format.category_id);
            let output_path = match artifact {
                RenderArtifact::Raster(raster) => {
                    let path = format!("{}/{}.{}", dir, stem, raster.format.extension());
                    files.push(DeliverableFile { path: path.clone(), bytes: raster.bytes.clone() });
                    path
                }
                RenderArtifact::Html5(html5) => {
                    let folder = format!("{}/{}", dir, stem);
                    push_html5(&mut files, &folder, html5);
                    format!("{}/", folder)
                }
            };
            let html5_path = outcome.companion_html5.as_ref().map(|html5| {
                let folder = format!("{}/{}-html5", dir, stem);
                push_html5(&mut files, &folder, html5);
                format!("{}/", folder)
            });

            entries.push(ManifestEntry {
                format_id: format.id.clone(),
                name: format.name.clone(),
                width: format.width,
                height: format.height,
                kind: artifact.type_label().to_string(),
                platform: format.platform_id.clone(),
                category: format.category_id.clone(),
                output_path,
                file_size_kb: round_kb(artifact.size_kb()),
                content_hash: outcome.content_hash.clone(),
                warnings: outcome.validation.warnings.clone(),
                errors: outcome.validation.errors.clone(),
                html5_path,
            });
        }

        if self.csv.enabled {
            if let Some(csv) = sklik_csv(&entries, &self.csv, copy) {
                files.push(DeliverableFile { path: SKLIK_CSV_FILE.to_string(), bytes: csv.into_bytes() });
            }
            if let Some(csv) = google_csv(&entries, &self.csv, copy) {
                files.push(DeliverableFile { path: GOOGLE_CSV_FILE.to_string(), bytes: csv.into_bytes() });
            }
        }

        let summary = ValidationSummary::from_results(ordered.iter().map(|o| &o.validation));
        let mut manifest = ExportManifest {
            export_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            catalog_version: self.catalog_version.clone(),
            failure_policy: self.policy,
            entries,
            excluded,
            summary,
            manifest_hash: String::new(),
        };
        manifest.manifest_hash = manifest.compute_hash()?;

        files.push(DeliverableFile {
            path: MANIFEST_FILE.to_string(),
            bytes: serde_json::to_vec_pretty(&manifest)?,
        });

        tracing::info!(
            packaged = manifest.entries.len(),
            excluded = manifest.excluded.len(),
            hash = %manifest.manifest_hash,
            "export packaged"
        );
        Ok(Deliverable { files, manifest })
    }
}

fn push_html5(files: &mut Vec<DeliverableFile>, folder: &str, html5: &Html5Artifact) {
    for (name, bytes) in html5.files() {
        files.push(DeliverableFile {
            path: format!("{}/{}", folder, name),
            bytes: bytes.to_vec(),
        });
    }
}

/// `{w}x{h}` unless taken in this directory, then `-2`, `-3`, ...
fn unique_stem(used: &mut HashSet<String>, format: &FormatSpec) -> String {
    let dir = format!("{}/{}", format.platform_id, format.category_id);
    let base = format.dimensions_label();
    let mut stem = base.clone();
    let mut n = 2;
    while !used.insert(format!("{}/{}", dir, stem)) {
        stem = format!("{}-{}", base, n);
        n += 1;
    }
    stem
}

fn round_kb(kb: f64) -> f64 {
    (kb * 100.0).round() / 100.0
}

// --- CSV ---

/// Quote a field when it holds the delimiter, a quote or a line break.
pub fn csv_field(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str], delimiter: char) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_field(f, delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string());
    line.push_str("\r\n");
    line
}

pub fn sklik_csv(entries: &[ManifestEntry], options: &CsvOptions, copy: &AdCopy) -> Option<String> {
    let rows: Vec<_> = entries.iter().filter(|e| e.platform == "sklik").collect();
    if rows.is_empty() {
        return None;
    }
    let mut out = csv_line(&["Campaign", "AdGroup", "Headline", "Description", "Image", "URL"], ';');
    for entry in rows {
        out.push_str(&csv_line(
            &[
                options.campaign.as_str(),
                options.ad_group.as_str(),
                copy.headline.as_str(),
                copy.description.as_str(),
                entry.output_path.as_str(),
                options.final_url.as_str(),
            ],
            ';',
        ));
    }
    Some(out)
}

pub fn google_csv(entries: &[ManifestEntry], options: &CsvOptions, copy: &AdCopy) -> Option<String> {
    let rows: Vec<_> = entries.iter().filter(|e| e.platform == "google").collect();
    if rows.is_empty() {
        return None;
    }
    let mut out = csv_line(&["Campaign", "AdGroup", "Headlines", "Descriptions", "URL", "Image"], ',');
    for entry in rows {
        out.push_str(&csv_line(
            &[
                options.campaign.as_str(),
                options.ad_group.as_str(),
                copy.headline.as_str(),
                copy.description.as_str(),
                options.final_url.as_str(),
                entry.output_path.as_str(),
            ],
            ',',
        ));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FormatCatalog;
    use crate::raster::RasterFormat;
    use crate::validation::Validator;

    fn outcome(id: &str, bytes: usize) -> FormatOutcome {
        let format = FormatCatalog::builtin().unwrap().get(id).unwrap().clone();
        let raster = RasterArtifact {
            bytes: vec![7; bytes],
            format: RasterFormat::Jpeg,
            width: format.width,
            height: format.height,
        };
        let validation = Validator::new().validate(&crate::validation::ValidationInput {
            format: &format,
            artifact: Some(ArtifactRef::Raster(&raster)),
            geometry: None,
        });
        FormatOutcome {
            content_hash: format!("hash-{}", id),
            format,
            artifact: Some(RenderArtifact::Raster(raster)),
            companion_html5: None,
            validation,
            failure: None,
        }
    }

    fn failed(id: &str) -> FormatOutcome {
        let format = FormatCatalog::builtin().unwrap().get(id).unwrap().clone();
        let validation = Validator::new().validate_failure(&format, "render", "Source image could not be decoded");
        FormatOutcome {
            content_hash: String::new(),
            format,
            artifact: None,
            companion_html5: None,
            validation,
            failure: Some("Source image could not be decoded".into()),
        }
    }

    fn packager(policy: FailurePolicy) -> ExportPackager {
        ExportPackager::new(policy, CsvOptions::default(), "test")
    }

    #[test]
    fn paths_follow_platform_category_size() {
        let d = packager(FailurePolicy::Exclude)
            .package(&[outcome("sklik-300x250", 1000)], &AdCopy::default())
            .unwrap();
        assert!(d.file("sklik/banners/300x250.jpg").is_some());
        assert_eq!(d.manifest.entries[0].output_path, "sklik/banners/300x250.jpg");
        assert!(d.file(MANIFEST_FILE).is_some());
        assert!(d.file(SKLIK_CSV_FILE).is_some());
        assert!(d.file(GOOGLE_CSV_FILE).is_none());
    }

    #[test]
    fn duplicate_sizes_get_suffix() {
        let a = outcome("sklik-300x250", 100);
        let mut b = outcome("sklik-300x250", 100);
        b.format.id = "sklik-300x250-alt".into();
        b.validation.format_id = b.format.id.clone();
        let d = packager(FailurePolicy::Exclude).package(&[b, a], &AdCopy::default()).unwrap();
        let paths: Vec<_> = d.manifest.entries.iter().map(|e| e.output_path.as_str()).collect();
        assert!(paths[0].ends_with("/300x250.jpg"));
        assert!(paths[1].ends_with("/300x250-2.jpg"));
        assert_eq!(d.manifest.entries[0].format_id, "sklik-300x250");
    }

    #[test]
    fn exclude_policy_drops_invalid() {
        let big = outcome("sklik-300x250", 200 * 1024);
        assert!(!big.validation.valid);
        let d = packager(FailurePolicy::Exclude)
            .package(&[big.clone(), outcome("sklik-728x90", 100)], &AdCopy::default())
            .unwrap();
        assert_eq!(d.manifest.entries.len(), 1);
        assert_eq!(d.manifest.excluded.len(), 1);
        assert!(d.manifest.excluded[0].reason.contains("exceeds limit 150 KB"));

        let d = packager(FailurePolicy::IncludeWithDiagnostics)
            .package(&[big], &AdCopy::default())
            .unwrap();
        assert_eq!(d.manifest.entries.len(), 1);
        assert_eq!(d.manifest.entries[0].errors.len(), 1);
    }

    #[test]
    fn unrenderable_always_excluded() {
        let d = packager(FailurePolicy::IncludeWithDiagnostics)
            .package(&[failed("sklik-300x250"), outcome("sklik-728x90", 100)], &AdCopy::default())
            .unwrap();
        assert_eq!(d.manifest.entries.len(), 1);
        assert_eq!(d.manifest.excluded[0].format_id, "sklik-300x250");
        assert_eq!(d.manifest.summary.error, 1);
        assert_eq!(d.manifest.summary.total, 2);
    }

    #[test]
    fn csv_rows_match_packaged_formats() {
        let copy = AdCopy { headline: "Sleva; 50%".into(), description: "Jen \"dnes\"".into() };
        let d = packager(FailurePolicy::Exclude)
            .package(
                &[outcome("sklik-300x250", 100), outcome("sklik-728x90", 100), failed("sklik-160x600")],
                &copy,
            )
            .unwrap();
        let csv = String::from_utf8(d.file(SKLIK_CSV_FILE).unwrap().bytes.clone()).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "Campaign;AdGroup;Headline;Description;Image;URL");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("\"Sleva; 50%\""));
        assert!(lines[1].contains("Jen \"\"dnes\"\""));
    }

    #[test]
    fn manifest_hash_is_stable_across_runs() {
        let run = || {
            packager(FailurePolicy::Exclude)
                .package(&[outcome("sklik-300x250", 100)], &AdCopy::default())
                .unwrap()
                .manifest
        };
        let (a, b) = (run(), run());
        assert_ne!(a.export_id, b.export_id);
        assert_eq!(a.manifest_hash, b.manifest_hash);
        assert_eq!(a.manifest_hash, a.compute_hash().unwrap());
    }

    #[test]
    fn writes_tree_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let d = packager(FailurePolicy::Exclude)
            .package(&[outcome("sklik-300x250", 100)], &AdCopy::default())
            .unwrap();
        d.write_to_dir(dir.path()).unwrap();
        let entry = &d.manifest.entries[0];
        assert_eq!(std::fs::read(dir.path().join(&entry.output_path)).unwrap().len(), 100);
        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest["entries"][0]["formatId"], "sklik-300x250");
        assert!(manifest["manifestHash"].as_str().unwrap().len() == 64);
    }

    #[test]
    fn csv_field_quoting() {
        assert_eq!(csv_field("plain", ','), "plain");
        assert_eq!(csv_field("a,b", ','), "\"a,b\"");
        assert_eq!(csv_field("a,b", ';'), "a,b");
        assert_eq!(csv_field("say \"hi\"", ';'), "\"say \"\"hi\"\"\"");
    }
}
