//! HTML5 Composer
//!
//! Same `LayoutGeometry` as the raster backend, expressed as absolutely
//! positioned boxes with one span per wrapped line. Animation runs on GSAP
//! loaded from `index.html`; navigation goes through `clickTag` only.

use serde::{Deserialize, Serialize};

use crate::brand::{Color, HAlign};
use crate::catalog::FormatSpec;
use crate::draw::escape_markup;
use crate::fonts::{family_names, is_generic_family};
use crate::layout::{LayoutGeometry, TextElement};
use crate::overlay::ShadowSpec;
use crate::validation::ViolationSeverity;

pub const DEFAULT_LIBRARY_URL: &str = "https://s0.2mdn.net/ads/studio/cached_libs/gsap_3.12.5_min.js";

/// Substrings ad networks reject in creative code.
pub const BANNED_APIS: &[&str] = &[
    "eval(",
    "new Function(",
    "document.write(",
    "window.location",
    "document.location",
    "top.location",
    "location.href",
    "location.replace(",
    "location.assign(",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AnimationKind {
    #[default]
    FadeIn,
    SlideUp,
    PulseCta,
    ZoomIn,
    Bounce,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 5] = [
        AnimationKind::FadeIn,
        AnimationKind::SlideUp,
        AnimationKind::PulseCta,
        AnimationKind::ZoomIn,
        AnimationKind::Bounce,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnimationKind::FadeIn => "fade-in",
            AnimationKind::SlideUp => "slide-up",
            AnimationKind::PulseCta => "pulse-cta",
            AnimationKind::ZoomIn => "zoom-in",
            AnimationKind::Bounce => "bounce",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKeyword {
    Infinite,
}

/// Extra plays after the first: a count (0 plays once) or `"infinite"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoopCount {
    Times(u32),
    Keyword(LoopKeyword),
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Times(0)
    }
}

impl LoopCount {
    /// GSAP `repeat` value.
    pub fn repeat(&self) -> i64 {
        match self {
            LoopCount::Times(n) => *n as i64,
            LoopCount::Keyword(LoopKeyword::Infinite) => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Html5Options {
    #[serde(default)]
    pub animation: AnimationKind,
    #[serde(default = "default_duration")]
    pub duration_secs: f32,
    #[serde(default, rename = "loop")]
    pub loop_count: LoopCount,
    /// Non-image payload budget.
    #[serde(default = "default_payload_budget", rename = "payloadBudgetKB")]
    pub payload_budget_kb: u32,
    #[serde(default)]
    pub click_tag_url: String,
    #[serde(default = "default_library_url")]
    pub library_url: String,
    /// Appended to script.js and scanned like generated code.
    #[serde(default)]
    pub custom_script: Option<String>,
    /// Injected into the banner container and scanned.
    #[serde(default)]
    pub custom_markup: Option<String>,
}

fn default_duration() -> f32 { 3.0 }
fn default_payload_budget() -> u32 { 100 }
fn default_library_url() -> String { DEFAULT_LIBRARY_URL.to_string() }

impl Default for Html5Options {
    fn default() -> Self {
        Self {
            animation: AnimationKind::default(),
            duration_secs: default_duration(),
            loop_count: LoopCount::default(),
            payload_budget_kb: default_payload_budget(),
            click_tag_url: String::new(),
            library_url: default_library_url(),
            custom_script: None,
            custom_markup: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFlag {
    pub severity: ViolationSeverity,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Html5Asset {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Html5Artifact {
    pub width: u32,
    pub height: u32,
    pub index_html: String,
    pub styles_css: String,
    pub script_js: String,
    pub assets: Vec<Html5Asset>,
    pub flags: Vec<ComplianceFlag>,
}

impl Html5Artifact {
    /// Package files in emission order.
    pub fn files(&self) -> Vec<(&str, &[u8])> {
        let mut files = vec![
            ("index.html", self.index_html.as_bytes()),
            ("styles.css", self.styles_css.as_bytes()),
            ("script.js", self.script_js.as_bytes()),
        ];
        files.extend(self.assets.iter().map(|a| (a.name.as_str(), a.bytes.as_slice())));
        files
    }

    /// html + css + js bytes.
    pub fn payload_bytes(&self) -> u64 {
        (self.index_html.len() + self.styles_css.len() + self.script_js.len()) as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.payload_bytes() + self.assets.iter().map(|a| a.bytes.len() as u64).sum::<u64>()
    }

    pub fn total_kb(&self) -> f64 {
        self.total_bytes() as f64 / 1024.0
    }

    pub fn has_errors(&self) -> bool {
        self.flags.iter().any(|f| f.severity == ViolationSeverity::Error)
    }
}

/// Image files referenced by the markup. Bytes are already encoded.
#[derive(Debug, Clone, Default)]
pub struct Html5Inputs {
    pub background_color: Color,
    pub background: Option<(String, Vec<u8>)>,
    pub logo: Option<(String, Vec<u8>)>,
    pub default_shadow: Option<ShadowSpec>,
}

// --- Timelines ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineTarget {
    Background,
    Headline,
    Subheadline,
    Cta,
    Logo,
}

impl TimelineTarget {
    pub fn selector(&self) -> &'static str {
        match self {
            TimelineTarget::Background => "#bg",
            TimelineTarget::Headline => "#headline",
            TimelineTarget::Subheadline => "#subheadline",
            TimelineTarget::Cta => "#cta",
            TimelineTarget::Logo => "#logo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenMethod {
    /// Animate from the given values to the CSS state.
    From,
    /// Animate from the current state to the given values.
    To,
}

/// Opacity/transform keyframe values; `None` leaves the property alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keyframe {
    pub opacity: Option<f32>,
    pub y: Option<f32>,
    pub scale: Option<f32>,
}

impl Keyframe {
    fn fade() -> Self {
        Self { opacity: Some(0.0), ..Default::default() }
    }
}

/// One tween; `start` and `length` are fractions of the total duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineStep {
    pub target: TimelineTarget,
    pub method: TweenMethod,
    pub values: Keyframe,
    pub start: f32,
    pub length: f32,
    pub ease: &'static str,
}

impl TimelineStep {
    fn new(target: TimelineTarget, method: TweenMethod, values: Keyframe, start: f32, length: f32, ease: &'static str) -> Self {
        Self { target, method, values, start, length, ease }
    }

    fn to_js(&self, duration: f32) -> String {
        let mut props = Vec::new();
        if let Some(o) = self.values.opacity {
            props.push(format!("opacity: {}", js_number(o)));
        }
        if let Some(y) = self.values.y {
            props.push(format!("y: {}", js_number(y)));
        }
        if let Some(s) = self.values.scale {
            props.push(format!("scale: {}", js_number(s)));
        }
        props.push(format!("duration: {}", js_number(self.length * duration)));
        props.push(format!("ease: \"{}\"", self.ease));
        let method = match self.method {
            TweenMethod::From => "from",
            TweenMethod::To => "to",
        };
        format!(
            "    tl.{}(\"{}\", {{ {} }}, {});",
            method,
            self.target.selector(),
            props.join(", "),
            js_number(self.start * duration)
        )
    }
}

fn js_number(v: f32) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

/// Steps for `kind`, restricted to the targets actually present.
pub fn timeline(kind: AnimationKind, present: &[TimelineTarget]) -> Vec<TimelineStep> {
    use TimelineTarget::*;

    let text_in = |values: Keyframe, ease: &'static str| {
        vec![
            TimelineStep::new(Headline, TweenMethod::From, values, 0.1, 0.3, ease),
            TimelineStep::new(Subheadline, TweenMethod::From, values, 0.25, 0.3, ease),
            TimelineStep::new(Cta, TweenMethod::From, values, 0.4, 0.3, ease),
            TimelineStep::new(Logo, TweenMethod::From, Keyframe::fade(), 0.4, 0.3, "power1.out"),
        ]
    };

    let mut steps = match kind {
        AnimationKind::FadeIn => {
            let mut s = vec![TimelineStep::new(Background, TweenMethod::From, Keyframe::fade(), 0.0, 0.3, "power1.out")];
            s.extend(text_in(Keyframe::fade(), "power1.out"));
            s
        }
        AnimationKind::SlideUp => text_in(
            Keyframe { opacity: Some(0.0), y: Some(20.0), scale: None },
            "power2.out",
        ),
        AnimationKind::PulseCta => {
            let mut s = text_in(Keyframe::fade(), "power1.out");
            s.push(TimelineStep::new(Cta, TweenMethod::To, Keyframe { scale: Some(1.08), ..Default::default() }, 0.75, 0.12, "sine.inOut"));
            s.push(TimelineStep::new(Cta, TweenMethod::To, Keyframe { scale: Some(1.0), ..Default::default() }, 0.87, 0.12, "sine.inOut"));
            s
        }
        AnimationKind::ZoomIn => {
            let mut s = vec![TimelineStep::new(
                Background,
                TweenMethod::From,
                Keyframe { scale: Some(1.15), ..Default::default() },
                0.0,
                1.0,
                "none",
            )];
            s.extend(text_in(Keyframe { opacity: Some(0.0), y: None, scale: Some(0.9) }, "power2.out"));
            s
        }
        AnimationKind::Bounce => text_in(
            Keyframe { opacity: Some(0.0), y: Some(-30.0), scale: None },
            "bounce.out",
        ),
    };
    steps.retain(|s| present.contains(&s.target));
    steps
}

// --- Compliance ---

/// Flags for banned APIs and `<video` in one piece of creative code.
pub fn scan_compliance(source: &str, origin: &str) -> Vec<ComplianceFlag> {
    let mut flags: Vec<ComplianceFlag> = BANNED_APIS
        .iter()
        .filter(|api| source.contains(*api))
        .map(|api| ComplianceFlag {
            severity: ViolationSeverity::Error,
            code: "banned_api".to_string(),
            message: format!("Banned API '{}' found in {}", api, origin),
        })
        .collect();
    if assigns_location(source) {
        flags.push(ComplianceFlag {
            severity: ViolationSeverity::Error,
            code: "banned_api".to_string(),
            message: format!("Assignment to location found in {}", origin),
        });
    }
    if opens_other_than_click_tag(source) {
        flags.push(ComplianceFlag {
            severity: ViolationSeverity::Error,
            code: "banned_api".to_string(),
            message: format!("window.open with a target other than clickTag found in {}", origin),
        });
    }
    if source.to_ascii_lowercase().contains("<video") {
        flags.push(ComplianceFlag {
            severity: ViolationSeverity::Error,
            code: "video_element".to_string(),
            message: format!("<video> element found in {}", origin),
        });
    }
    flags
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `location = ...` or `location.href = ...`, with or without an owner object.
fn assigns_location(source: &str) -> bool {
    source.match_indices("location").any(|(i, m)| {
        if source[..i].chars().next_back().is_some_and(is_ident_char) {
            return false;
        }
        let rest = source[i + m.len()..].trim_start();
        let rest = rest.strip_prefix(".href").map(str::trim_start).unwrap_or(rest);
        rest.starts_with('=') && !rest.starts_with("==")
    })
}

fn opens_other_than_click_tag(source: &str) -> bool {
    source.match_indices("window.open(").any(|(i, m)| {
        let arg = source[i + m.len()..].trim_start();
        let arg = arg.strip_prefix("window.").unwrap_or(arg);
        match arg.strip_prefix("clickTag") {
            Some(rest) => rest.starts_with(is_ident_char),
            None => true,
        }
    })
}

// --- Composer ---

pub struct Html5Composer {
    options: Html5Options,
}

impl Html5Composer {
    pub fn new(options: Html5Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Html5Options {
        &self.options
    }

    #[tracing::instrument(skip_all, fields(format = %format.id))]
    pub fn compose(&self, format: &FormatSpec, geometry: &LayoutGeometry, inputs: &Html5Inputs) -> Html5Artifact {
        let mut present = Vec::new();
        if inputs.background.is_some() {
            present.push(TimelineTarget::Background);
        }
        if geometry.headline.visible {
            present.push(TimelineTarget::Headline);
        }
        if geometry.subheadline.visible {
            present.push(TimelineTarget::Subheadline);
        }
        if geometry.cta.visible {
            present.push(TimelineTarget::Cta);
        }
        if inputs.logo.is_some() && geometry.logo.is_some() {
            present.push(TimelineTarget::Logo);
        }

        let index_html = self.index_html(format, geometry, inputs);
        let styles_css = self.styles_css(geometry, inputs);
        let script_js = self.script_js(&present);

        let mut assets = Vec::new();
        if let Some((name, bytes)) = &inputs.background {
            assets.push(Html5Asset { name: name.clone(), bytes: bytes.clone() });
        }
        if let (Some((name, bytes)), Some(_)) = (&inputs.logo, &geometry.logo) {
            assets.push(Html5Asset { name: name.clone(), bytes: bytes.clone() });
        }

        let mut artifact = Html5Artifact {
            width: geometry.width,
            height: geometry.height,
            index_html,
            styles_css,
            script_js,
            assets,
            flags: Vec::new(),
        };
        artifact.flags = self.compliance_flags(&artifact);
        tracing::debug!(
            bytes = artifact.total_bytes(),
            flags = artifact.flags.len(),
            animation = self.options.animation.name(),
            "html5 composed"
        );
        artifact
    }

    fn compliance_flags(&self, artifact: &Html5Artifact) -> Vec<ComplianceFlag> {
        let mut flags = scan_compliance(&artifact.index_html, "index.html");
        flags.extend(scan_compliance(&artifact.script_js, "script.js"));
        flags.extend(scan_compliance(&artifact.styles_css, "styles.css"));

        let budget = self.options.payload_budget_kb as u64 * 1024;
        let payload = artifact.payload_bytes();
        if payload > budget {
            flags.push(ComplianceFlag {
                severity: ViolationSeverity::Warning,
                code: "payload_budget".to_string(),
                message: format!(
                    "Non-image payload {:.1} KB exceeds budget {} KB",
                    payload as f64 / 1024.0,
                    self.options.payload_budget_kb
                ),
            });
        }
        flags
    }

    fn index_html(&self, format: &FormatSpec, geometry: &LayoutGeometry, inputs: &Html5Inputs) -> String {
        let mut body = String::new();
        if inputs.background.is_some() {
            body.push_str("    <div id=\"bg\"></div>\n");
        }
        for (id, element) in [("headline", &geometry.headline), ("subheadline", &geometry.subheadline)] {
            if !element.visible {
                continue;
            }
            body.push_str(&format!("    <div id=\"{}\" class=\"text\">\n", id));
            for line in &element.lines {
                body.push_str(&format!("      <span>{}</span>\n", escape_markup(&line.text)));
            }
            body.push_str("    </div>\n");
        }
        if geometry.cta.visible {
            body.push_str(&format!("    <div id=\"cta\">{}</div>\n", escape_markup(&geometry.cta.text)));
        }
        if let (Some((name, _)), Some(_)) = (&inputs.logo, &geometry.logo) {
            body.push_str(&format!("    <img id=\"logo\" src=\"{}\" alt=\"\">\n", escape_markup(name)));
        }
        if let Some(markup) = &self.options.custom_markup {
            body.push_str(markup);
            body.push('\n');
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="ad.size" content="width={w},height={h}">
  <title>{title}</title>
  <link rel="stylesheet" href="styles.css">
  <script src="{lib}"></script>
</head>
<body>
  <div id="banner">
{body}  </div>
  <script src="script.js"></script>
</body>
</html>
"#,
            w = geometry.width,
            h = geometry.height,
            title = escape_markup(&format.name),
            lib = escape_markup(&self.options.library_url),
            body = body,
        )
    }

    fn styles_css(&self, geometry: &LayoutGeometry, inputs: &Html5Inputs) -> String {
        let mut css = format!(
            "* {{ margin: 0; padding: 0; box-sizing: border-box; }}\n\
             #banner {{ position: relative; width: {w}px; height: {h}px; overflow: hidden; cursor: pointer; background: {bg}; font-family: {font}; }}\n",
            w = geometry.width,
            h = geometry.height,
            bg = inputs.background_color.to_css(),
            font = css_font_family(&geometry.font_family),
        );
        if let Some((name, _)) = &inputs.background {
            css.push_str(&format!(
                "#bg {{ position: absolute; left: 0; top: 0; width: {}px; height: {}px; background: url(\"{}\") center / cover no-repeat; }}\n",
                geometry.width, geometry.height, css_url(name)
            ));
        }

        let shadow = geometry.shadow.or(inputs.default_shadow);
        for (id, element) in [("headline", &geometry.headline), ("subheadline", &geometry.subheadline)] {
            if element.visible {
                css.push_str(&text_rule(id, element, geometry.align, shadow.as_ref()));
            }
        }
        css.push_str(".text span { display: block; white-space: nowrap; }\n");

        let cta = &geometry.cta;
        if cta.visible {
            css.push_str(&format!(
                "#cta {{ position: absolute; left: {}px; top: {}px; width: {}px; height: {}px; display: flex; align-items: center; justify-content: center; background: {}; color: {}; border-radius: {}px; font-size: {}px; font-weight: 700; white-space: nowrap; }}\n",
                px(cta.button.x),
                px(cta.button.y),
                px(cta.button.width),
                px(cta.button.height),
                cta.fill.to_css(),
                cta.text_color.to_css(),
                px(cta.radius),
                px(cta.font_size),
            ));
        }
        if let (Some(_), Some(logo)) = (&inputs.logo, &geometry.logo) {
            css.push_str(&format!(
                "#logo {{ position: absolute; left: {}px; top: {}px; width: {}px; height: {}px; opacity: {}; }}\n",
                px(logo.rect.x),
                px(logo.rect.y),
                px(logo.rect.width),
                px(logo.rect.height),
                js_number(logo.opacity),
            ));
        }
        css
    }

    fn script_js(&self, present: &[TimelineTarget]) -> String {
        let steps = timeline(self.options.animation, present);
        let tweens: Vec<String> = steps
            .iter()
            .map(|s| s.to_js(self.options.duration_secs))
            .collect();
        let mut script = format!(
            r#"var clickTag = "{click}";

(function () {{
  var banner = document.getElementById("banner");
  banner.addEventListener("click", function () {{
    window.open(clickTag, "_blank");
  }});

  var attempts = 0;
  function start() {{
    if (typeof window.gsap === "undefined") {{
      if (attempts++ < 100) {{
        setTimeout(start, 50);
      }}
      return;
    }}
    var tl = gsap.timeline({{ repeat: {repeat} }});
{tweens}
  }}
  start();
}})();
"#,
            click = js_string(&self.options.click_tag_url),
            repeat = self.options.loop_count.repeat(),
            tweens = tweens.join("\n"),
        );
        if let Some(custom) = &self.options.custom_script {
            script.push('\n');
            script.push_str(custom);
            script.push('\n');
        }
        script
    }
}

/// `font-family` value that cannot close its declaration or rule.
fn css_font_family(family: &str) -> String {
    let names: Vec<String> = family_names(family)
        .into_iter()
        .map(|name| {
            name.chars()
                .filter(|c| !matches!(*c, ';' | '{' | '}' | '<' | '>' | '"' | '\'' | '\\') && !c.is_control())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .map(|name| if is_generic_family(&name) { name } else { format!("\"{}\"", name) })
        .collect();
    if names.is_empty() {
        "sans-serif".to_string()
    } else {
        names.join(", ")
    }
}

fn css_url(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(*c, '"' | '\'' | '\\' | '(' | ')' | '<' | '>' | ';' | '{' | '}') && !c.is_control())
        .collect()
}

fn px(v: f32) -> String {
    js_number(v)
}

fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '<' => out.push_str("\\u003c"),
            _ => out.push(c),
        }
    }
    out
}

fn text_rule(id: &str, element: &TextElement, align: HAlign, shadow: Option<&ShadowSpec>) -> String {
    let left = element.lines.iter().map(|l| l.x).fold(f32::MAX, f32::min);
    let right = element.lines.iter().map(|l| l.x + l.width).fold(f32::MIN, f32::max);
    let top = element.lines.first().map(|l| l.y).unwrap_or(0.0);
    let items = match align {
        HAlign::Left => "flex-start",
        HAlign::Center => "center",
        HAlign::Right => "flex-end",
    };
    let weight = element.weight.css_value();
    let shadow = shadow
        .map(|s| {
            format!(
                " text-shadow: {}px {}px {}px {};",
                js_number(s.offset_x),
                js_number(s.offset_y),
                js_number(s.blur),
                s.color.to_css()
            )
        })
        .unwrap_or_default();
    format!(
        "#{} {{ position: absolute; left: {}px; top: {}px; width: {}px; display: flex; flex-direction: column; align-items: {}; font-size: {}px; line-height: {}px; font-weight: {}; color: {};{} }}\n",
        id,
        px(left),
        px(top),
        px((right - left).max(0.0)),
        items,
        px(element.font_size),
        px(element.line_height),
        weight,
        element.color.to_css(),
        shadow,
    )
}
