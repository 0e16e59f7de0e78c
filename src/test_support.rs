// Fakes and page builders shared by unit tests

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::core::errors::{ExtractionError, ExtractionResult, TranslationError, TranslationResult};
use crate::core::language::Language;
use crate::core::types::{BoundingBox, Region};
use crate::services::extraction::{TextExtraction, TextExtractor};
use crate::services::rendering::{TextBackend, TextMeasure};
use crate::services::translation::Translator;
use crate::utils::encode_png;

const ADVANCE: f32 = 0.6;

pub fn white_page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
}

/// White page with solid black rectangles standing in for text blocks
pub fn page_with_blobs(width: u32, height: u32, blobs: &[(u32, u32, u32, u32)]) -> DynamicImage {
    let mut page = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for &(x, y, w, h) in blobs {
        for py in y..(y + h).min(height) {
            for px in x..(x + w).min(width) {
                page.put_pixel(px, py, Rgba([0, 0, 0, 255]));
            }
        }
    }
    DynamicImage::ImageRgba8(page)
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    encode_png(image).unwrap()
}

pub fn archive_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// An extracted region whose translation is already filled in
pub fn region_with_translation(page: &RgbaImage, (x, y, w, h): (u32, u32, u32, u32), text: &str) -> Region {
    let bbox = BoundingBox::within(x, y, w, h, page.width(), page.height()).unwrap();
    let crop = image::imageops::crop_imm(page, x, y, w, h).to_image();
    let mut region = Region::new(bbox, crop, [0, 0, 0], 21);
    region.set_extraction(text, 90.0);
    region.translated_text = text.to_string();
    region.release_crop();
    region
}

/// Every character is `0.6 × font size` wide
#[derive(Debug, Default)]
pub struct FixedAdvance;

impl TextMeasure for FixedAdvance {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * ADVANCE
    }
}

/// Draws each non-space character as a solid block, so tests can see ink
/// without font files
#[derive(Debug, Default)]
pub struct BlockGlyphBackend;

impl TextMeasure for BlockGlyphBackend {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        FixedAdvance.line_width(text, font_size)
    }
}

impl TextBackend for BlockGlyphBackend {
    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font_size: f32,
        _line_height: f32,
        x: i32,
        y: i32,
        color: Rgba<u8>,
        clip: &BoundingBox,
    ) {
        let advance = font_size * ADVANCE;
        let glyph_w = (advance * 0.8).max(1.0) as i32;
        let glyph_h = (font_size * 0.8).max(1.0) as i32;

        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = x + (i as f32 * advance) as i32;
            for py in y..y + glyph_h {
                for px in left..left + glyph_w {
                    if px < 0 || py < 0 || !clip.contains(px as u32, py as u32) {
                        continue;
                    }
                    if (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

/// Reads the same text from every region
pub struct FixedTextExtractor {
    text: String,
    confidence: f32,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedTextExtractor {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering each region
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for FixedTextExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(&self, _crop: &RgbaImage, _language: Language) -> ExtractionResult<TextExtraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(TextExtraction {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

pub struct UnreadableExtractor;

#[async_trait]
impl TextExtractor for UnreadableExtractor {
    fn name(&self) -> &str {
        "unreadable"
    }

    async fn extract(&self, _crop: &RgbaImage, _language: Language) -> ExtractionResult<TextExtraction> {
        Err(ExtractionError::Unreadable {
            reason: "smudged".to_string(),
        })
    }
}

/// Tags text with the target ISO code and counts calls
#[derive(Default)]
pub struct CountingTranslator {
    calls: AtomicUsize,
}

impl CountingTranslator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for CountingTranslator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn translate(&self, text: &str, _source: Language, target: Language) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[{}] {}", target.iso_code(), text))
    }
}

pub struct FailingTranslator;

#[async_trait]
impl Translator for FailingTranslator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn translate(&self, _text: &str, _source: Language, _target: Language) -> TranslationResult<String> {
        Err(TranslationError::Unavailable("connection refused".to_string()))
    }
}

pub struct RejectingTranslator;

#[async_trait]
impl Translator for RejectingTranslator {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn translate(&self, _text: &str, _source: Language, _target: Language) -> TranslationResult<String> {
        Err(TranslationError::Rejected {
            reason: "unsupported text".to_string(),
        })
    }
}

/// Identity translation after a delay, tracking peak concurrency
pub struct SlowTranslator {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowTranslator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for SlowTranslator {
    fn name(&self) -> &str {
        "slow"
    }

    async fn translate(&self, text: &str, _source: Language, _target: Language) -> TranslationResult<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(text.to_string())
    }
}
