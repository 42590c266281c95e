//! Text measurement seam.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

impl FontWeight {
    pub fn css_value(&self) -> u16 {
        match self {
            FontWeight::Regular => 400,
            FontWeight::Bold => 700,
        }
    }
}

/// Measures the advance width of a single line of text in pixels.
pub trait TextMeasurer: Send + Sync {
    fn measure(&self, text: &str, font_size: f32, weight: FontWeight) -> f32;
}

/// Per-character advance classes tuned for common sans-serif faces.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMeasurer;

const BOLD_FACTOR: f32 = 1.06;

fn advance(c: char) -> f32 {
    match c {
        ' ' => 0.28,
        'i' | 'l' | 'j' | 'I' | '!' | '.' | ',' | '\'' | '|' | ':' | ';' => 0.28,
        'f' | 't' | 'r' => 0.36,
        'm' | 'w' => 0.83,
        'M' | 'W' => 0.92,
        '%' | '@' => 0.88,
        c if c.is_ascii_digit() => 0.56,
        c if c.is_uppercase() => 0.68,
        _ => 0.54,
    }
}

impl TextMeasurer for HeuristicMeasurer {
    fn measure(&self, text: &str, font_size: f32, weight: FontWeight) -> f32 {
        let em: f32 = text.chars().map(advance).sum();
        let factor = match weight {
            FontWeight::Regular => 1.0,
            FontWeight::Bold => BOLD_FACTOR,
        };
        em * font_size * factor
    }
}
