//! Font Library
//!
//! One fontdb database shared by text measurement and rasterization, so the
//! widths the layout engine wraps against are the widths resvg draws.

use resvg::usvg::fontdb::{Database, Family, Query, Stretch, Style, Weight, ID};
use std::path::PathBuf;
use std::sync::Arc;

use crate::layout::{FontWeight, HeuristicMeasurer, TextMeasurer};

/// Family of the bundled faces; always resolvable.
pub const FALLBACK_FAMILY: &str = "DejaVu Sans";

const EMBEDDED_REGULAR: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const EMBEDDED_BOLD: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

const SANS_SERIF_CANDIDATES: &[&str] = &[
    "Arial",
    "Helvetica",
    "Helvetica Neue",
    "Verdana",
    "Liberation Sans",
    "Noto Sans",
    "FreeSans",
    FALLBACK_FAMILY,
];

const GENERIC_FAMILIES: &[&str] = &["sans-serif", "serif", "monospace", "cursive", "fantasy", "system-ui"];

const SERIF_CANDIDATES: &[&str] = &[
    "Times New Roman",
    "Times",
    "Georgia",
    "DejaVu Serif",
    "Liberation Serif",
    "Noto Serif",
    "FreeSerif",
];

pub struct FontLibrary {
    db: Arc<Database>,
}

impl FontLibrary {
    /// System fonts, the configured directories and the bundled faces.
    pub fn new(load_system_fonts: bool, font_dirs: &[PathBuf]) -> Self {
        let mut db = Database::new();
        if load_system_fonts {
            db.load_system_fonts();
        }
        for dir in font_dirs {
            db.load_fonts_dir(dir);
        }
        Self::finish(db)
    }

    /// Bundled faces only. Output does not depend on the host.
    pub fn embedded() -> Self {
        Self::finish(Database::new())
    }

    fn finish(mut db: Database) -> Self {
        db.load_font_data(EMBEDDED_REGULAR.to_vec());
        db.load_font_data(EMBEDDED_BOLD.to_vec());

        // fontdb maps the generics to "Arial"/"Times New Roman" whether or not
        // they are installed.
        let sans = first_installed(&db, SANS_SERIF_CANDIDATES).unwrap_or(FALLBACK_FAMILY);
        let serif = first_installed(&db, SERIF_CANDIDATES).unwrap_or(sans);
        db.set_sans_serif_family(sans);
        db.set_serif_family(serif);

        tracing::debug!(faces = db.len(), sans, serif, "font database ready");
        Self { db: Arc::new(db) }
    }

    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Face for a CSS `font-family` list, looking only at the listed families.
    pub fn resolve(&self, css_family: &str, weight: FontWeight) -> Option<ID> {
        let names = family_names(css_family);
        let families: Vec<Family<'_>> = names.iter().map(|name| to_family(name)).collect();
        if families.is_empty() {
            return None;
        }
        self.db.query(&Query {
            families: &families,
            weight: to_weight(weight),
            stretch: Stretch::Normal,
            style: Style::Normal,
        })
    }

    /// `font-family` value for SVG text: the brand list with the bundled
    /// family appended so no text node is dropped.
    pub fn svg_family(&self, css_family: &str) -> String {
        let names = family_names(css_family);
        if names.iter().any(|n| n.eq_ignore_ascii_case(FALLBACK_FAMILY)) {
            return names.iter().map(|n| quote_family(n)).collect::<Vec<_>>().join(", ");
        }
        names
            .iter()
            .map(|n| quote_family(n))
            .chain(std::iter::once(quote_family(FALLBACK_FAMILY)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Advance widths in em units, one per char of `text`; `None` for chars
    /// the face has no glyph for.
    fn advances(&self, id: ID, text: &str) -> Vec<Option<f32>> {
        self.db
            .with_face_data(id, |data, index| {
                let Ok(face) = ttf_parser::Face::parse(data, index) else {
                    return vec![None; text.chars().count()];
                };
                let units = face.units_per_em().max(1) as f32;
                text.chars()
                    .map(|c| {
                        let glyph = face.glyph_index(c)?;
                        face.glyph_hor_advance(glyph).map(|a| a as f32 / units)
                    })
                    .collect()
            })
            .unwrap_or_else(|| vec![None; text.chars().count()])
    }
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new(true, &[])
    }
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary").field("faces", &self.db.len()).finish()
    }
}

/// Measures with the real glyph advances of one brand font. Chars the brand
/// face lacks are measured in the bundled face, as resvg draws them.
pub struct FontMeasurer {
    fonts: Arc<FontLibrary>,
    /// Brand face, then bundled face; indexed by `weight_slot`.
    faces: [(Option<ID>, Option<ID>); 2],
}

impl FontMeasurer {
    pub fn new(fonts: Arc<FontLibrary>, family: impl Into<String>) -> Self {
        let family = family.into();
        let faces = [FontWeight::Regular, FontWeight::Bold].map(|weight| {
            (fonts.resolve(&family, weight), fonts.resolve(FALLBACK_FAMILY, weight))
        });
        Self { fonts, faces }
    }

    fn width(&self, text: &str, weight: FontWeight) -> Option<f32> {
        let (primary, fallback) = self.faces[weight_slot(weight)];
        let first = primary.or(fallback)?;
        let mut advances = self.fonts.advances(first, text);
        if let (Some(_), Some(fallback)) = (primary, fallback) {
            if advances.iter().any(Option::is_none) {
                let backup = self.fonts.advances(fallback, text);
                for (a, b) in advances.iter_mut().zip(backup) {
                    if a.is_none() {
                        *a = b;
                    }
                }
            }
        }
        let missing = advances.iter().filter(|a| a.is_none()).count();
        if missing == advances.len() && !advances.is_empty() {
            return None;
        }
        // notdef boxes are roughly half an em
        Some(advances.into_iter().map(|a| a.unwrap_or(0.5)).sum())
    }
}

impl TextMeasurer for FontMeasurer {
    fn measure(&self, text: &str, font_size: f32, weight: FontWeight) -> f32 {
        match self.width(text, weight) {
            Some(em) => em * font_size,
            None => HeuristicMeasurer.measure(text, font_size, weight),
        }
    }
}

fn weight_slot(weight: FontWeight) -> usize {
    match weight {
        FontWeight::Regular => 0,
        FontWeight::Bold => 1,
    }
}

fn first_installed<'a>(db: &Database, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|name| {
        db.faces()
            .any(|face| face.families.iter().any(|(family, _)| family.eq_ignore_ascii_case(name)))
    })
}

/// Names in a CSS `font-family` list, unquoted.
pub(crate) fn family_names(css_family: &str) -> Vec<String> {
    css_family
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn to_family(name: &str) -> Family<'_> {
    match name.to_ascii_lowercase().as_str() {
        "sans-serif" | "system-ui" => Family::SansSerif,
        "serif" => Family::Serif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name),
    }
}

fn to_weight(weight: FontWeight) -> Weight {
    match weight {
        FontWeight::Regular => Weight::NORMAL,
        FontWeight::Bold => Weight::BOLD,
    }
}

pub(crate) fn is_generic_family(name: &str) -> bool {
    GENERIC_FAMILIES.iter().any(|g| g.eq_ignore_ascii_case(name))
}

fn quote_family(name: &str) -> String {
    if is_generic_family(name) {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', ""))
    }
}
