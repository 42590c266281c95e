//! Engine Configuration
//!
//! Every field has a default so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::export::FailurePolicy;
use crate::html5::Html5Options;
use crate::overlay::ShadowSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Encode PNG even where JPEG is allowed.
    #[serde(default)]
    pub prefer_png: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub debug_safe_zone: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Also emit an HTML5 folder for image formats.
    #[serde(default)]
    pub emit_html5_for_raster: bool,
    #[serde(default = "default_shadow")]
    pub default_shadow: Option<ShadowSpec>,
    /// Extra directories scanned for .ttf/.otf/.ttc faces.
    #[serde(default)]
    pub font_dirs: Vec<PathBuf>,
    /// Load the host's installed fonts. Off leaves `fontDirs` and the bundled
    /// DejaVu Sans faces, which makes text output host independent.
    #[serde(default = "default_true")]
    pub system_fonts: bool,
    #[serde(default)]
    pub html5: Html5Options,
}

fn default_jpeg_quality() -> u8 { 90 }
fn default_workers() -> usize { 1 }
fn default_shadow() -> Option<ShadowSpec> { Some(ShadowSpec::default()) }
fn default_true() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            prefer_png: false,
            workers: default_workers(),
            debug_safe_zone: false,
            failure_policy: FailurePolicy::default(),
            emit_html5_for_raster: false,
            default_shadow: default_shadow(),
            font_dirs: Vec::new(),
            system_fonts: true,
            html5: Html5Options::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(EngineError::Config(format!(
                "jpegQuality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.workers == 0 || self.workers > 64 {
            return Err(EngineError::Config(format!(
                "workers must be between 1 and 64, got {}",
                self.workers
            )));
        }
        if !(self.html5.duration_secs > 0.0 && self.html5.duration_secs <= 30.0) {
            return Err(EngineError::Config(
                "html5.durationSecs must be in (0, 30]".to_string(),
            ));
        }
        if self.html5.payload_budget_kb == 0 {
            return Err(EngineError::Config("html5.payloadBudgetKB must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.workers, 1);
        assert!(config.default_shadow.is_some());
        assert!(config.system_fonts);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = EngineConfig { jpeg_quality: 0, ..Default::default() };
        assert!(config.validate().is_err());
        let config = EngineConfig { workers: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"jpegQuality": 75, "workers": 4, "failurePolicy": "includeWithDiagnostics"}"#).unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.jpeg_quality, 75);
        assert_eq!(config.workers, 4);
        assert_eq!(config.failure_policy, FailurePolicy::IncludeWithDiagnostics);
    }
}
