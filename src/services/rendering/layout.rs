// Font sizing, greedy word wrap and vertical truncation.
//
// Pure functions over a width measurer so the fitting rules can be checked
// without any font files.

use crate::core::config::RenderingConfig;
use crate::core::types::BoundingBox;

/// Font metrics the layout needs
pub trait TextMeasure {
    /// Width of a single line of text at a given size
    fn line_width(&self, text: &str, font_size: f32) -> f32;

    /// Ascent plus descent of the font used at `font_size`, when a font is
    /// available to read it from
    fn line_height(&self, _font_size: f32) -> Option<f32> {
        None
    }
}

/// Detect if text contains CJK (Chinese, Japanese, Korean) characters
pub fn is_cjk_text(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{4E00}'..='\u{9FFF}' |  // CJK Unified Ideographs
            '\u{3040}'..='\u{309F}' |  // Hiragana
            '\u{30A0}'..='\u{30FF}' |  // Katakana
            '\u{AC00}'..='\u{D7AF}'    // Hangul
        )
    })
}

/// Sizing and spacing parameters, a subset of [`RenderingConfig`]
#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    pub font_scale: f32,
    pub min_font_size: f32,
    pub max_font_size: f32,
    pub length_reference: usize,
    /// Line height as a multiple of font size when the measurer has no font metrics
    pub line_height_ratio: f32,
}

impl From<&RenderingConfig> for LayoutParams {
    fn from(config: &RenderingConfig) -> Self {
        Self {
            font_scale: config.font_scale,
            min_font_size: config.min_font_size,
            max_font_size: config.max_font_size,
            length_reference: config.length_reference,
            line_height_ratio: config.line_height_ratio,
        }
    }
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self::from(&RenderingConfig::default())
    }
}

/// Font size for `text` in a box `box_height` pixels tall.
///
/// Starts at `font_scale * box_height`, shrinks as the text grows past
/// `length_reference` characters and is clamped to the configured range.
pub fn choose_font_size(box_height: u32, text: &str, params: &LayoutParams) -> f32 {
    let base = box_height as f32 * params.font_scale;

    let length = text.chars().filter(|c| !c.is_whitespace()).count()
        + text.split_whitespace().count().saturating_sub(1);
    let reference = params.length_reference.max(1) as f32;
    let length_factor = (1.0 / (0.5 + 0.5 * length as f32 / reference)).min(1.0);

    (base * length_factor).clamp(params.min_font_size, params.max_font_size)
}

/// Greedy wrap into lines no wider than `max_width`.
///
/// A word wider than `max_width` is placed alone on its own line. Text with
/// CJK characters and no spaces wraps between characters.
pub fn wrap_words<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: f32,
    font_size: f32,
    measure: &M,
) -> Vec<String> {
    let (tokens, separator): (Vec<String>, &str) =
        if !text.trim().contains(char::is_whitespace) && is_cjk_text(text) {
            (text.trim().chars().map(String::from).collect(), "")
        } else {
            (text.split_whitespace().map(String::from).collect(), " ")
        };

    let mut lines = Vec::new();
    let mut current = String::new();

    for token in tokens {
        if current.is_empty() {
            current = token;
            continue;
        }

        let candidate = format!("{}{}{}", current, separator, token);
        if measure.line_width(&candidate, font_size) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, token));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// One line positioned in page coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub top: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub font_size: f32,
    pub line_height: f32,
    /// Lines that fit, top-down
    pub lines: Vec<PlacedLine>,
    /// Wrapped lines dropped for lack of vertical space
    pub truncated: usize,
}

/// Size, wrap and place `text` inside `bbox`.
///
/// Lines are left-aligned at the box edge and stacked from the box top. A
/// line is kept only if it ends at or above the box bottom; the rest are
/// dropped without resizing or ellipsis.
pub fn layout_text<M: TextMeasure + ?Sized>(
    bbox: &BoundingBox,
    text: &str,
    params: &LayoutParams,
    measure: &M,
) -> TextLayout {
    let font_size = choose_font_size(bbox.height(), text, params);
    let line_height = measure
        .line_height(font_size)
        .filter(|height| *height > 0.0)
        .unwrap_or(font_size * params.line_height_ratio);
    let wrapped = wrap_words(text, bbox.width() as f32, font_size, measure);

    let bottom = bbox.bottom() as f32;
    let mut lines = Vec::with_capacity(wrapped.len());
    let mut top = bbox.y() as f32;

    for line in &wrapped {
        if top + line_height > bottom {
            break;
        }
        lines.push(PlacedLine {
            width: measure.line_width(line, font_size),
            text: line.clone(),
            x: bbox.x() as f32,
            top,
        });
        top += line_height;
    }

    TextLayout {
        font_size,
        line_height,
        truncated: wrapped.len() - lines.len(),
        lines,
    }
}
