//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations against one format's output.
//! The validator folds them into a per-format `ValidationResult`.

use serde::{Deserialize, Serialize};

use crate::catalog::{FormatId, FormatSpec};
use crate::html5::Html5Artifact;
use crate::layout::LayoutGeometry;
use crate::raster::RasterArtifact;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
}

impl ValidationViolation {
    fn new(rule: &str, severity: ViolationSeverity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity,
            message: message.into(),
            expected: None,
            actual: None,
            remediation: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub format_id: FormatId,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(rename = "fileSizeKB")]
    pub file_size_kb: Option<f64>,
    #[serde(default)]
    pub violations: Vec<ValidationViolation>,
    /// Skipped by cancellation before rendering. Neither valid nor an error.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl ValidationResult {
    fn from_violations(format_id: &str, file_size_kb: Option<f64>, violations: Vec<ValidationViolation>) -> Self {
        let messages = |severity| {
            violations
                .iter()
                .filter(|v| v.severity == severity)
                .map(|v| v.message.clone())
                .collect::<Vec<_>>()
        };
        let errors = messages(ViolationSeverity::Error);
        let warnings = messages(ViolationSeverity::Warning);
        Self {
            format_id: format_id.to_string(),
            valid: errors.is_empty(),
            errors,
            warnings,
            file_size_kb,
            violations,
            cancelled: false,
        }
    }

    pub fn cancelled(format_id: &str) -> Self {
        Self {
            format_id: format_id.to_string(),
            valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            file_size_kb: None,
            violations: Vec::new(),
            cancelled: true,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Counts over a batch: `ok` is valid without warnings, `warning` valid with.
/// Cancelled formats count toward `total` and `cancelled` only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationSummary {
    pub total: usize,
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    #[serde(default)]
    pub cancelled: usize,
}

impl ValidationSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ValidationResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.total += 1;
            if result.cancelled {
                summary.cancelled += 1;
            } else if !result.valid {
                summary.error += 1;
            } else if result.has_warnings() {
                summary.warning += 1;
            } else {
                summary.ok += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ArtifactRef<'a> {
    Raster(&'a RasterArtifact),
    Html5(&'a Html5Artifact),
}

/// Input for validation; `artifact` is `None` for formats that failed to render.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub format: &'a FormatSpec,
    pub artifact: Option<ArtifactRef<'a>>,
    pub geometry: Option<&'a LayoutGeometry>,
}

impl ValidationInput<'_> {
    pub fn file_size_kb(&self) -> Option<f64> {
        match self.artifact? {
            ArtifactRef::Raster(r) => Some(r.size_kb()),
            ArtifactRef::Html5(h) => Some(h.total_kb()),
        }
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct FileSizeRule;

impl ValidationRule for FileSizeRule {
    fn name(&self) -> &'static str { "file_size" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        let Some(ArtifactRef::Raster(raster)) = input.artifact else {
            return vec![];
        };
        let limit = input.format.max_size_kb;
        if raster.size_bytes() <= input.format.max_size_bytes() {
            return vec![];
        }
        vec![ValidationViolation {
            expected: Some(format!("<= {} KB", limit)),
            actual: Some(format!("{:.1} KB", raster.size_kb())),
            remediation: vec![
                "Lower the JPEG quality".to_string(),
                "Simplify the background image".to_string(),
            ],
            ..ValidationViolation::new(
                self.name(),
                ViolationSeverity::Error,
                format!("File size {:.1} KB exceeds limit {} KB", raster.size_kb(), limit),
            )
        }]
    }
}

pub struct SafeZoneRule;

impl ValidationRule for SafeZoneRule {
    fn name(&self) -> &'static str { "safe_zone" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        match &input.format.safe_zone {
            Some(zone) => vec![ValidationViolation::new(
                self.name(),
                ViolationSeverity::Warning,
                format!("Safe zone: {}", zone.description),
            )],
            None => vec![],
        }
    }
}

pub struct Html5ComplianceRule;

impl ValidationRule for Html5ComplianceRule {
    fn name(&self) -> &'static str { "html5_compliance" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        let Some(ArtifactRef::Html5(html5)) = input.artifact else {
            return vec![];
        };
        html5
            .flags
            .iter()
            .map(|flag| ValidationViolation {
                actual: Some(flag.code.clone()),
                ..ValidationViolation::new(self.name(), flag.severity, flag.message.clone())
            })
            .collect()
    }
}

pub struct Html5SizeRule;

impl ValidationRule for Html5SizeRule {
    fn name(&self) -> &'static str { "html5_size" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        let Some(ArtifactRef::Html5(html5)) = input.artifact else {
            return vec![];
        };
        if html5.total_bytes() <= input.format.max_size_bytes() {
            return vec![];
        }
        vec![ValidationViolation {
            expected: Some(format!("<= {} KB", input.format.max_size_kb)),
            actual: Some(format!("{:.1} KB", html5.total_kb())),
            remediation: vec!["Reduce the background image weight".to_string()],
            ..ValidationViolation::new(
                self.name(),
                ViolationSeverity::Error,
                format!(
                    "HTML5 package {:.1} KB exceeds limit {} KB",
                    html5.total_kb(),
                    input.format.max_size_kb
                ),
            )
        }]
    }
}

pub struct FileTypeRule;

impl ValidationRule for FileTypeRule {
    fn name(&self) -> &'static str { "file_type" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        let Some(ArtifactRef::Raster(raster)) = input.artifact else {
            return vec![];
        };
        let ext = raster.format.extension();
        let accepted = input.format.allows(ext) || (ext == "jpg" && input.format.allows("jpeg"));
        if accepted {
            return vec![];
        }
        vec![ValidationViolation {
            expected: Some(input.format.allowed_file_types.join(", ")),
            actual: Some(ext.to_string()),
            ..ValidationViolation::new(
                self.name(),
                ViolationSeverity::Warning,
                format!(
                    "File type {} not in allowed types ({})",
                    ext,
                    input.format.allowed_file_types.join(", ")
                ),
            )
        }]
    }
}

pub struct LayoutRule;

impl ValidationRule for LayoutRule {
    fn name(&self) -> &'static str { "layout" }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationViolation> {
        let Some(geometry) = input.geometry else {
            return vec![];
        };
        let mut violations: Vec<_> = geometry
            .notes
            .iter()
            .map(|note| ValidationViolation::new(self.name(), ViolationSeverity::Warning, note.clone()))
            .collect();
        if let Some(overflow) = &geometry.overflow {
            violations.push(ValidationViolation {
                remediation: vec!["Shorten the copy or lower the font size tier".to_string()],
                ..ValidationViolation::new(self.name(), ViolationSeverity::Warning, overflow.to_string())
            });
        }
        violations
    }
}

/// Validator orchestrates rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(FileSizeRule),
                Box::new(Html5ComplianceRule),
                Box::new(Html5SizeRule),
                Box::new(FileTypeRule),
                Box::new(LayoutRule),
                Box::new(SafeZoneRule),
            ],
        }
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationResult {
        let mut all_violations = vec![];
        for rule in &self.rules {
            all_violations.extend(rule.validate(input));
        }
        ValidationResult::from_violations(&input.format.id, input.file_size_kb(), all_violations)
    }

    /// Result for a format that produced no artifact. Rules that only need the
    /// format (safe zone) still run.
    pub fn validate_failure(&self, format: &FormatSpec, rule: &str, reason: &str) -> ValidationResult {
        let input = ValidationInput { format, artifact: None, geometry: None };
        let mut all_violations = vec![ValidationViolation::new(rule, ViolationSeverity::Error, reason)];
        for r in &self.rules {
            all_violations.extend(r.validate(&input));
        }
        ValidationResult::from_violations(&format.id, None, all_violations)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
