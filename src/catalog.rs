//! Format Catalog - Platform Constraints As Data
//!
//! `platformId -> categoryId -> formats`. Loaded once, validated at load,
//! read-only afterwards. Formats inherit byte limit and file types from their
//! category unless they carry their own.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::geometry::{Rect, Size};
use crate::ENGINE_VERSION;

pub type FormatId = String;

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub version: String,
    pub engine_min_version: String,
    pub platforms: BTreeMap<String, Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub categories: BTreeMap<String, FormatCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryType,
    #[serde(rename = "maxSizeKB")]
    pub max_size_kb: u32,
    pub file_types: Vec<String>,
    pub formats: Vec<FormatEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Image,
    Branding,
    Video,
    Html5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatEntry {
    pub id: FormatId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, rename = "maxSizeKB")]
    pub max_size_kb: Option<u32>,
    #[serde(default)]
    pub allowed_file_types: Option<Vec<String>>,
    #[serde(default)]
    pub safe_zone: Option<SafeZone>,
    #[serde(default)]
    pub is_video: bool,
}

/// Dead zone covered by surrounding page chrome. Advisory only.
///
/// The visible sub-rectangle is `[left, width - right] x [top, top + visibleHeight]`,
/// `bottom` is the dead band below it and `centerWidth` a dead central column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafeZone {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
    #[serde(default)]
    pub center_width: u32,
    pub visible_height: u32,
    pub description: String,
}

impl SafeZone {
    pub fn visible_rect(&self, width: u32) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            width.saturating_sub(self.left.saturating_add(self.right)) as f32,
            self.visible_height as f32,
        )
    }

    /// Dead central column, if any, spanning the full height.
    pub fn center_rect(&self, width: u32, height: u32) -> Option<Rect> {
        if self.center_width == 0 {
            return None;
        }
        let x = (width.saturating_sub(self.center_width)) as f32 / 2.0;
        Some(Rect::new(x, 0.0, self.center_width as f32, height as f32))
    }

    fn check(&self, width: u32, height: u32) -> Result<(), String> {
        let horizontal = self.left as u64 + self.right as u64;
        if horizontal > width as u64 {
            return Err(format!(
                "horizontal insets {}+{} exceed width {}",
                self.left, self.right, width
            ));
        }
        if self.top as u64 + self.visible_height as u64 + self.bottom as u64 > height as u64 {
            return Err(format!(
                "vertical bands {}+{}+{} exceed height {}",
                self.top, self.visible_height, self.bottom, height
            ));
        }
        if self.center_width as u64 > width as u64 - horizontal {
            return Err(format!(
                "center column {} wider than visible width",
                self.center_width
            ));
        }
        Ok(())
    }
}

/// One named output size plus its platform constraints, flattened out of the
/// catalog tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormatSpec {
    pub id: FormatId,
    pub platform_id: String,
    pub category_id: String,
    pub category_type: CategoryType,
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "maxSizeKB")]
    pub max_size_kb: u32,
    pub allowed_file_types: Vec<String>,
    #[serde(default)]
    pub safe_zone: Option<SafeZone>,
    #[serde(default)]
    pub is_video: bool,
}

impl FormatSpec {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_kb as u64 * 1024
    }

    pub fn is_html5(&self) -> bool {
        self.category_type == CategoryType::Html5
    }

    pub fn allows(&self, ext: &str) -> bool {
        self.allowed_file_types.iter().any(|t| t.eq_ignore_ascii_case(ext))
    }

    pub fn dimensions_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Validated catalog with a flat index ordered by format id.
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    document: CatalogDocument,
    index: BTreeMap<FormatId, FormatSpec>,
}

impl FormatCatalog {
    pub fn builtin() -> EngineResult<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn load_from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> EngineResult<Self> {
        let document: CatalogDocument = serde_json::from_str(content)?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> EngineResult<Self> {
        check_engine_version(&document)?;

        let mut index = BTreeMap::new();
        for (platform_id, platform) in &document.platforms {
            for (category_id, category) in &platform.categories {
                for entry in &category.formats {
                    let spec = flatten(platform_id, category_id, category, entry);
                    check_format(&spec)?;
                    if index.insert(spec.id.clone(), spec).is_some() {
                        return Err(EngineError::Catalog(format!(
                            "duplicate format id '{}'",
                            entry.id
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            version = %document.version,
            formats = index.len(),
            "format catalog loaded"
        );
        Ok(Self { document, index })
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    pub fn get(&self, id: &str) -> Option<&FormatSpec> {
        self.index.get(id)
    }

    /// All formats ordered by id.
    pub fn formats(&self) -> impl Iterator<Item = &FormatSpec> {
        self.index.values()
    }

    /// Resolve a selection. An empty selection means every non-video format.
    /// The result is ordered by id and free of duplicates.
    pub fn select(&self, ids: &[FormatId]) -> EngineResult<Vec<FormatSpec>> {
        if ids.is_empty() {
            return Ok(self.index.values().filter(|f| !f.is_video).cloned().collect());
        }
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        wanted
            .into_iter()
            .map(|id| {
                self.index
                    .get(id)
                    .cloned()
                    .ok_or_else(|| EngineError::FormatNotFound(id.to_string()))
            })
            .collect()
    }
}

fn flatten(
    platform_id: &str,
    category_id: &str,
    category: &FormatCategory,
    entry: &FormatEntry,
) -> FormatSpec {
    FormatSpec {
        id: entry.id.clone(),
        platform_id: platform_id.to_string(),
        category_id: category_id.to_string(),
        category_type: category.kind,
        name: entry.name.clone(),
        width: entry.width,
        height: entry.height,
        max_size_kb: entry.max_size_kb.unwrap_or(category.max_size_kb),
        allowed_file_types: entry
            .allowed_file_types
            .clone()
            .unwrap_or_else(|| category.file_types.clone()),
        safe_zone: entry.safe_zone.clone(),
        is_video: entry.is_video || category.kind == CategoryType::Video,
    }
}

fn check_format(spec: &FormatSpec) -> EngineResult<()> {
    if spec.width == 0 || spec.height == 0 || spec.max_size_kb == 0 {
        return Err(EngineError::Catalog(format!(
            "format '{}' must have positive width, height and maxSizeKB",
            spec.id
        )));
    }
    if let Some(zone) = &spec.safe_zone {
        zone.check(spec.width, spec.height).map_err(|reason| {
            EngineError::Catalog(format!("format '{}' safe zone: {}", spec.id, reason))
        })?;
    }
    Ok(())
}

fn check_engine_version(document: &CatalogDocument) -> EngineResult<()> {
    let engine_ver = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| EngineError::Catalog("Invalid engine version".into()))?;
    let min_ver = semver::Version::parse(&document.engine_min_version)
        .map_err(|_| EngineError::Catalog("Invalid catalog engineMinVersion".into()))?;

    if engine_ver < min_ver {
        return Err(EngineError::Catalog(format!(
            "catalog {} requires engine >= {}, current is {}",
            document.version, document.engine_min_version, ENGINE_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(formats: &str) -> String {
        format!(
            r#"{{
                "version": "2024.1",
                "engineMinVersion": "1.0.0",
                "platforms": {{
                    "test": {{
                        "name": "Test",
                        "categories": {{
                            "display": {{
                                "name": "Display",
                                "type": "image",
                                "maxSizeKB": 150,
                                "fileTypes": ["jpg", "png"],
                                "formats": [{}]
                            }}
                        }}
                    }}
                }}
            }}"#,
            formats
        )
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = FormatCatalog::builtin().unwrap();
        assert!(catalog.get("sklik-970x310").is_some());
        let ids: Vec<_> = catalog.formats().map(|f| f.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn formats_inherit_category_limits() {
        let json = minimal(r#"{"id": "a", "name": "A", "width": 300, "height": 250}"#);
        let catalog = FormatCatalog::from_json(&json).unwrap();
        let spec = catalog.get("a").unwrap();
        assert_eq!(spec.max_size_kb, 150);
        assert_eq!(spec.allowed_file_types, vec!["jpg", "png"]);
        assert_eq!(spec.platform_id, "test");
        assert_eq!(spec.category_id, "display");
    }

    #[test]
    fn zero_dimension_rejected() {
        let json = minimal(r#"{"id": "a", "name": "A", "width": 0, "height": 250}"#);
        assert!(matches!(FormatCatalog::from_json(&json), Err(EngineError::Catalog(_))));
    }

    #[test]
    fn safe_zone_outside_canvas_rejected() {
        let json = minimal(
            r#"{"id": "a", "name": "A", "width": 300, "height": 250,
                "safeZone": {"top": 100, "visibleHeight": 200, "description": "x"}}"#,
        );
        assert!(FormatCatalog::from_json(&json).is_err());
    }

    #[test]
    fn huge_safe_zone_insets_rejected_without_overflow() {
        let json = minimal(
            r#"{"id": "a", "name": "A", "width": 300, "height": 250,
                "safeZone": {"left": 4294967295, "right": 10, "top": 4294967295, "bottom": 4294967295,
                             "visibleHeight": 10, "description": "x"}}"#,
        );
        let err = FormatCatalog::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("exceed"));

        let zone = SafeZone {
            top: 0,
            bottom: 0,
            left: u32::MAX,
            right: u32::MAX,
            center_width: 0,
            visible_height: 10,
            description: String::new(),
        };
        assert_eq!(zone.visible_rect(300).width, 0.0);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = minimal(
            r#"{"id": "a", "name": "A", "width": 300, "height": 250},
               {"id": "a", "name": "B", "width": 728, "height": 90}"#,
        );
        let err = FormatCatalog::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn future_engine_requirement_rejected() {
        let json = minimal("").replace("\"1.0.0\"", "\"99.0.0\"");
        assert!(FormatCatalog::from_json(&json).is_err());
    }

    #[test]
    fn empty_selection_skips_video() {
        let catalog = FormatCatalog::builtin().unwrap();
        let selected = catalog.select(&[]).unwrap();
        assert!(!selected.is_empty());
        assert!(selected.iter().all(|f| !f.is_video));
    }

    #[test]
    fn unknown_selection_is_an_error() {
        let catalog = FormatCatalog::builtin().unwrap();
        let err = catalog.select(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::FormatNotFound(_)));
    }
}
