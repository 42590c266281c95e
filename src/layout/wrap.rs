//! Greedy word wrapping against a pixel width.

use super::measure::{FontWeight, TextMeasurer};

const ELLIPSIS: char = '\u{2026}';

/// Wrap `text` so no line is wider than `max_width`.
///
/// Explicit newlines are kept as hard breaks. A word wider than `max_width`
/// on its own is split between characters.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    weight: FontWeight,
    max_width: f32,
    measurer: &dyn TextMeasurer,
) -> Vec<String> {
    let fits = |s: &str| measurer.measure(s, font_size, weight) <= max_width;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_string();
            } else {
                let mut pieces = break_word(word, &fits);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Split a word into chunks that each fit; every chunk holds at least one char.
fn break_word(word: &str, fits: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut chunk = String::new();
    for c in word.chars() {
        chunk.push(c);
        if !fits(&chunk) && chunk.chars().count() > 1 {
            chunk.pop();
            pieces.push(std::mem::take(&mut chunk));
            chunk.push(c);
        }
    }
    if !chunk.is_empty() {
        pieces.push(chunk);
    }
    pieces
}

/// Shorten a single line with a trailing ellipsis until it fits.
pub fn truncate_to_width(
    text: &str,
    font_size: f32,
    weight: FontWeight,
    max_width: f32,
    measurer: &dyn TextMeasurer,
) -> String {
    let single = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if measurer.measure(&single, font_size, weight) <= max_width {
        return single;
    }
    let mut chars: Vec<char> = single.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>().trim_end().to_string() + &ELLIPSIS.to_string();
        if measurer.measure(&candidate, font_size, weight) <= max_width {
            return candidate;
        }
    }
    String::new()
}
