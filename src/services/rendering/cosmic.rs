use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
    Wrap,
};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{info, warn};

use super::layout::TextMeasure;
use super::TextBackend;
use crate::core::types::BoundingBox;

/// Text backend using cosmic-text for shaping and swash for rasterization.
///
/// Fonts come from `fonts_dir` and, optionally, the system font database.
/// Shaping needs `&mut FontSystem`, so both caches sit behind a mutex.
pub struct CosmicTextBackend {
    font_system: Mutex<FontSystem>,
    swash_cache: Mutex<SwashCache>,
    has_fonts: bool,
}

/// Advance per character, as a fraction of font size, assumed when no font
/// is available to measure with
const FALLBACK_ADVANCE: f32 = 0.6;

impl CosmicTextBackend {
    pub fn new(fonts_dir: &Path, load_system_fonts: bool) -> Self {
        let mut db = fontdb::Database::new();

        if load_system_fonts {
            db.load_system_fonts();
        }
        if fonts_dir.is_dir() {
            db.load_fonts_dir(fonts_dir);
        } else {
            info!("Font directory {} not found", fonts_dir.display());
        }

        let has_fonts = !db.is_empty();
        if has_fonts {
            info!("✓ Renderer initialized with {} font faces", db.len());
        } else {
            warn!("No fonts loaded; regions will be blanked without text");
        }

        Self {
            font_system: Mutex::new(FontSystem::new_with_locale_and_db("en-US".to_string(), db)),
            swash_cache: Mutex::new(SwashCache::new()),
            has_fonts,
        }
    }

    /// Shape one unwrapped line
    fn shape_line(font_system: &mut FontSystem, text: &str, font_size: f32, line_height: f32) -> Buffer {
        let mut buffer = Buffer::new(font_system, Metrics::new(font_size, line_height));
        buffer.set_size(font_system, None, None);
        buffer.set_wrap(font_system, Wrap::None);

        let attrs = Attrs::new().family(Family::SansSerif);
        buffer.set_text(font_system, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(font_system, false);
        buffer
    }
}

impl TextMeasure for CosmicTextBackend {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }
        if !self.has_fonts {
            return text.chars().count() as f32 * font_size * FALLBACK_ADVANCE;
        }
        let mut font_system = self.font_system.lock();
        let buffer = Self::shape_line(&mut font_system, text, font_size, font_size);
        buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max)
    }

    /// Ascent + descent of the face the shaper picks for Latin text
    fn line_height(&self, font_size: f32) -> Option<f32> {
        if !self.has_fonts {
            return None;
        }
        let mut font_system = self.font_system.lock();
        let buffer = Self::shape_line(&mut font_system, "Ay", font_size, font_size);
        let font_id = buffer
            .layout_runs()
            .flat_map(|run| run.glyphs.iter())
            .map(|glyph| glyph.font_id)
            .next()?;

        let font = font_system.get_font(font_id)?;
        let metrics = font.as_swash().metrics(&[]);
        if metrics.units_per_em == 0 {
            return None;
        }
        Some((metrics.ascent + metrics.descent.abs()) * font_size / metrics.units_per_em as f32)
    }
}

impl TextBackend for CosmicTextBackend {
    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font_size: f32,
        line_height: f32,
        x: i32,
        y: i32,
        color: Rgba<u8>,
        clip: &BoundingBox,
    ) {
        if !self.has_fonts {
            return;
        }
        let mut font_system = self.font_system.lock();
        let mut swash_cache = self.swash_cache.lock();
        let buffer = Self::shape_line(&mut font_system, text, font_size, line_height);

        let cosmic_color = CosmicColor::rgba(color[0], color[1], color[2], color[3]);
        let (min_x, min_y) = (clip.x() as i32, clip.y() as i32);
        let (max_x, max_y) = (clip.right() as i32, clip.bottom() as i32);

        buffer.draw(&mut font_system, &mut swash_cache, cosmic_color, |px_x, px_y, w, h, pixel_color| {
            if pixel_color.a() == 0 {
                return;
            }
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let img_x = x + px_x + dx;
                    let img_y = y + px_y + dy;
                    if img_x < min_x || img_x >= max_x || img_y < min_y || img_y >= max_y {
                        continue;
                    }

                    let existing = canvas.get_pixel(img_x as u32, img_y as u32);

                    // Alpha blend
                    let alpha = pixel_color.a() as f32 / 255.0;
                    let inv_alpha = 1.0 - alpha;

                    let blended = Rgba([
                        ((pixel_color.r() as f32 * alpha) + (existing[0] as f32 * inv_alpha)) as u8,
                        ((pixel_color.g() as f32 * alpha) + (existing[1] as f32 * inv_alpha)) as u8,
                        ((pixel_color.b() as f32 * alpha) + (existing[2] as f32 * inv_alpha)) as u8,
                        existing[3].max(pixel_color.a()),
                    ]);

                    canvas.put_pixel(img_x as u32, img_y as u32, blended);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_height_from_system_font() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CosmicTextBackend::new(dir.path(), true);
        if !backend.has_fonts {
            eprintln!("no system fonts, skipping");
            return;
        }
        // Typical faces put ascent + descent between 0.9 and 1.6 em
        let Some(height) = backend.line_height(20.0) else {
            return;
        };
        assert!(height > 15.0 && height < 35.0, "line height {height}");
        let double = backend.line_height(40.0).unwrap();
        assert!((double - 2.0 * height).abs() < 0.5);
    }

    #[test]
    fn test_empty_font_database_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CosmicTextBackend::new(dir.path(), false);

        assert_eq!(backend.line_width("   ", 20.0), 0.0);
        assert!((backend.line_width("HI", 10.0) - 12.0).abs() < 1e-4);
        assert_eq!(backend.line_height(10.0), None);

        let blank = RgbaImage::from_pixel(40, 20, Rgba([255, 255, 255, 255]));
        let mut canvas = blank.clone();
        let clip = BoundingBox::within(0, 0, 40, 20, 40, 20).unwrap();
        backend.draw_line(&mut canvas, "HI", 12.0, 16.0, 0, 0, Rgba([0, 0, 0, 255]), &clip);
        assert_eq!(canvas, blank);
    }
}
