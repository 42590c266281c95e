//! Brand Kit - colors, font family, logo variants and placement rules

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RGBA color, serialized as `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Relative luminance in [0, 1] (sRGB weights, no gamma).
    pub fn luminance(&self) -> f32 {
        (0.2126 * self.r as f32 + 0.7152 * self.g as f32 + 0.0722 * self.b as f32) / 255.0
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// `rgba(...)` form for CSS and SVG attributes.
    pub fn to_css(&self) -> String {
        if self.a == 255 {
            self.to_hex()
        } else {
            format!(
                "rgba({},{},{},{:.3})",
                self.r,
                self.g,
                self.b,
                self.a as f32 / 255.0
            )
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("invalid color '{}'", s))
        };
        match hex.len() {
            3 if hex.is_ascii() => {
                let mut out = [0u8; 3];
                for (slot, c) in out.iter_mut().zip(hex.chars()) {
                    let d = c.to_digit(16).ok_or_else(|| format!("invalid color '{}'", s))?;
                    *slot = (d * 17) as u8;
                }
                Ok(Color::rgb(out[0], out[1], out[2]))
            }
            6 if hex.is_ascii() => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 if hex.is_ascii() => Ok(Color {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => Err(format!("invalid color '{}'", s)),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

/// One of the nine named anchor positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub fn horizontal(&self) -> HAlign {
        match self {
            Anchor::TopLeft | Anchor::CenterLeft | Anchor::BottomLeft => HAlign::Left,
            Anchor::TopCenter | Anchor::Center | Anchor::BottomCenter => HAlign::Center,
            Anchor::TopRight | Anchor::CenterRight | Anchor::BottomRight => HAlign::Right,
        }
    }

    pub fn vertical(&self) -> VAlign {
        match self {
            Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight => VAlign::Top,
            Anchor::CenterLeft | Anchor::Center | Anchor::CenterRight => VAlign::Center,
            Anchor::BottomLeft | Anchor::BottomCenter | Anchor::BottomRight => VAlign::Bottom,
        }
    }
}

/// Encoded logo image (PNG/JPEG), base64 in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogoImage(pub Vec<u8>);

impl TryFrom<String> for LogoImage {
    type Error = base64::DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        base64::engine::general_purpose::STANDARD
            .decode(value.trim())
            .map(LogoImage)
    }
}

impl From<LogoImage> for String {
    fn from(logo: LogoImage) -> Self {
        base64::engine::general_purpose::STANDARD.encode(logo.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoVariants {
    #[serde(default)]
    pub main: Option<LogoImage>,
    #[serde(default)]
    pub light: Option<LogoImage>,
    #[serde(default)]
    pub dark: Option<LogoImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoVariant {
    Main,
    Light,
    Dark,
}

impl LogoVariant {
    /// Lookup order for a background of the given luminance.
    pub fn preference(auto_select: bool, background_luminance: Option<f32>) -> [LogoVariant; 4] {
        let preferred = match (auto_select, background_luminance) {
            (true, Some(lum)) if lum > 0.5 => LogoVariant::Dark,
            (true, Some(_)) => LogoVariant::Light,
            _ => LogoVariant::Main,
        };
        [preferred, LogoVariant::Main, LogoVariant::Light, LogoVariant::Dark]
    }
}

impl LogoVariants {
    pub fn get(&self, variant: LogoVariant) -> Option<&LogoImage> {
        match variant {
            LogoVariant::Main => self.main.as_ref(),
            LogoVariant::Light => self.light.as_ref(),
            LogoVariant::Dark => self.dark.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.light.is_none() && self.dark.is_none()
    }

    /// Pick the variant to draw over a background of the given luminance.
    ///
    /// Bright backgrounds get the dark logo, dark backgrounds the light one.
    /// Falls back to the main logo, then to whatever variant exists.
    pub fn select(&self, auto_select: bool, background_luminance: Option<f32>) -> Option<(LogoVariant, &LogoImage)> {
        LogoVariant::preference(auto_select, background_luminance)
            .into_iter()
            .find_map(|v| self.get(v).map(|img| (v, img)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoRules {
    #[serde(default = "default_true")]
    pub auto_apply: bool,
    #[serde(default = "default_logo_anchor")]
    pub position: Anchor,
    #[serde(default = "default_logo_size")]
    pub size_percent: f32,
    #[serde(default = "default_logo_padding")]
    pub padding_px: f32,
    #[serde(default = "default_logo_opacity")]
    pub opacity_percent: f32,
    #[serde(default = "default_true")]
    pub auto_select_variant: bool,
}

fn default_true() -> bool { true }
fn default_logo_anchor() -> Anchor { Anchor::TopRight }
fn default_logo_size() -> f32 { 15.0 }
fn default_logo_padding() -> f32 { 10.0 }
fn default_logo_opacity() -> f32 { 100.0 }

impl Default for LogoRules {
    fn default() -> Self {
        Self {
            auto_apply: true,
            position: default_logo_anchor(),
            size_percent: default_logo_size(),
            padding_px: default_logo_padding(),
            opacity_percent: default_logo_opacity(),
            auto_select_variant: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandKit {
    #[serde(default = "default_primary")]
    pub primary_color: Color,
    #[serde(default = "default_secondary")]
    pub secondary_color: Color,
    #[serde(default = "default_text")]
    pub text_color: Color,
    #[serde(default = "default_cta")]
    pub cta_color: Color,
    #[serde(default = "default_cta_text")]
    pub cta_text_color: Color,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub logos: LogoVariants,
    #[serde(default)]
    pub logo_rules: LogoRules,
}

fn default_primary() -> Color { Color::rgb(0x1f, 0x29, 0x37) }
fn default_secondary() -> Color { Color::rgb(0x37, 0x41, 0x51) }
fn default_text() -> Color { Color::WHITE }
fn default_cta() -> Color { Color::rgb(0xe1, 0x1d, 0x48) }
fn default_cta_text() -> Color { Color::WHITE }
fn default_font_family() -> String { "Arial, Helvetica, sans-serif".to_string() }

impl Default for BrandKit {
    fn default() -> Self {
        Self {
            primary_color: default_primary(),
            secondary_color: default_secondary(),
            text_color: default_text(),
            cta_color: default_cta(),
            cta_text_color: default_cta_text(),
            font_family: default_font_family(),
            logos: LogoVariants::default(),
            logo_rules: LogoRules::default(),
        }
    }
}

impl BrandKit {
    /// Whether a logo should be placed at all.
    pub fn applies_logo(&self) -> bool {
        self.logo_rules.auto_apply && !self.logos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!("#fff".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("#e11d48".parse::<Color>().unwrap(), Color::rgb(0xe1, 0x1d, 0x48));
        assert_eq!("#00000080".parse::<Color>().unwrap().a, 0x80);
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
    }

    #[test]
    fn color_serde_uses_hex_strings() {
        let json = serde_json::to_string(&Color::rgb(1, 2, 3)).unwrap();
        assert_eq!(json, r##""#010203""##);
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::rgb(1, 2, 3));
    }

    #[test]
    fn anchor_splits_into_axes() {
        assert_eq!(Anchor::BottomRight.horizontal(), HAlign::Right);
        assert_eq!(Anchor::BottomRight.vertical(), VAlign::Bottom);
        let parsed: Anchor = serde_json::from_str(r#""center-left""#).unwrap();
        assert_eq!(parsed, Anchor::CenterLeft);
    }

    #[test]
    fn logo_variant_follows_background() {
        let logos = LogoVariants {
            main: Some(LogoImage(vec![1])),
            light: Some(LogoImage(vec![2])),
            dark: Some(LogoImage(vec![3])),
        };
        assert_eq!(logos.select(true, Some(0.9)).unwrap().0, LogoVariant::Dark);
        assert_eq!(logos.select(true, Some(0.1)).unwrap().0, LogoVariant::Light);
        assert_eq!(logos.select(false, Some(0.9)).unwrap().0, LogoVariant::Main);
    }

    #[test]
    fn logo_variant_falls_back_to_main() {
        let logos = LogoVariants {
            main: Some(LogoImage(vec![1])),
            ..Default::default()
        };
        assert_eq!(logos.select(true, Some(0.9)).unwrap().0, LogoVariant::Main);
        assert!(LogoVariants::default().select(true, None).is_none());
    }
}
