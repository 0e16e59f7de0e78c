pub mod cosmic;
pub mod layout;

use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::{BoundingBox, PageRegions, Region};

pub use cosmic::CosmicTextBackend;
pub use layout::{layout_text, LayoutParams, PlacedLine, TextLayout, TextMeasure};

/// Measures and rasterizes single lines of text
pub trait TextBackend: TextMeasure + Send + Sync {
    /// Draw `text` with its top-left at (`x`, `y`), touching only pixels in `clip`
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
    );
}

/// Replaces each region's content with its translated text
pub struct LayoutRenderer {
    backend: Arc<dyn TextBackend>,
    params: LayoutParams,
    min_render_size: u32,
    fill_color: Rgba<u8>,
    text_color: Rgba<u8>,
    text_color_from_region: bool,
}

impl LayoutRenderer {
    pub fn new(config: &RenderingConfig, backend: Arc<dyn TextBackend>) -> Self {
        let [fr, fg, fb] = config.fill_color;
        let [tr, tg, tb] = config.text_color;
        Self {
            backend,
            params: LayoutParams::from(config),
            min_render_size: config.min_render_size,
            fill_color: Rgba([fr, fg, fb, 255]),
            text_color: Rgba([tr, tg, tb, 255]),
            text_color_from_region: config.text_color_from_region,
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// Render one page after checking the regions were detected on it
    pub fn render_page(&self, page: &RgbaImage, regions: &PageRegions) -> RenderingResult<RgbaImage> {
        if page.width() != regions.width || page.height() != regions.height {
            return Err(RenderingError::PageSizeMismatch {
                page_index: regions.page_index,
                expected_width: regions.width,
                expected_height: regions.height,
                actual_width: page.width(),
                actual_height: page.height(),
            });
        }
        Ok(self.render(page, &regions.regions))
    }

    /// Return a copy of `page` with every region repainted.
    ///
    /// Pixels outside all region boxes are left untouched.
    #[instrument(skip(self, page, regions), fields(regions = regions.len()))]
    pub fn render(&self, page: &RgbaImage, regions: &[Region]) -> RgbaImage {
        let mut canvas = page.clone();
        let mut rendered = 0usize;

        for region in regions {
            if self.render_region(&mut canvas, region) {
                rendered += 1;
            }
        }

        debug!("Rendered {}/{} regions", rendered, regions.len());
        canvas
    }

    /// Returns false when the region was too small to touch
    fn render_region(&self, canvas: &mut RgbaImage, region: &Region) -> bool {
        let bbox = region.bbox();
        if bbox.width() < self.min_render_size || bbox.height() < self.min_render_size {
            trace!("Skipping {}x{} region", bbox.width(), bbox.height());
            return false;
        }
        // Boxes detected on a differently sized page are skipped
        if bbox.right() > canvas.width() || bbox.bottom() > canvas.height() {
            return false;
        }

        fill_rect(canvas, bbox, self.fill_color);

        let layout = layout_text(bbox, &region.translated_text, &self.params, self.backend.as_ref());
        if layout.truncated > 0 {
            debug!(
                "Dropped {} of {} lines at {:.1}px in {}x{} box",
                layout.truncated,
                layout.truncated + layout.lines.len(),
                layout.font_size,
                bbox.width(),
                bbox.height()
            );
        }

        let color = self.text_color_for(region);
        for line in &layout.lines {
            self.backend.draw_line(
                canvas,
                &line.text,
                layout.font_size,
                layout.line_height,
                line.x.round() as i32,
                line.top.round() as i32,
                color,
                bbox,
            );
        }
        true
    }

    /// Region colour when enabled and readable on the fill, else the default
    fn text_color_for(&self, region: &Region) -> Rgba<u8> {
        if !self.text_color_from_region {
            return self.text_color;
        }
        let [r, g, b] = region.color;
        let fill = luminance(self.fill_color[0], self.fill_color[1], self.fill_color[2]);
        if (luminance(r, g, b) - fill).abs() >= MIN_CONTRAST {
            Rgba([r, g, b, 255])
        } else {
            self.text_color
        }
    }
}

/// Minimum luminance gap between text and fill, on a 0-255 scale
const MIN_CONTRAST: f32 = 96.0;

fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

fn fill_rect(canvas: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>) {
    for y in bbox.y()..bbox.bottom() {
        for x in bbox.x()..bbox.right() {
            canvas.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{region_with_translation, BlockGlyphBackend};

    fn renderer() -> LayoutRenderer {
        LayoutRenderer::new(&RenderingConfig::default(), Arc::new(BlockGlyphBackend::default()))
    }

    fn gray_page(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn test_long_translation_is_truncated_inside_box() {
        let page = gray_page(300, 100);
        let region = region_with_translation(&page, (10, 10, 200, 40), "BONJOUR LE MONDE DE LA TRADUCTION");
        let out = renderer().render(&page, &[region]);

        // Only pixels inside the box change
        for (x, y, pixel) in out.enumerate_pixels() {
            let inside = (10..210).contains(&x) && (10..50).contains(&y);
            if !inside {
                assert_eq!(pixel, page.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }

        // Something dark was drawn on the first line, nothing past the box bottom
        let inked = out.enumerate_pixels().filter(|(_, _, p)| p[0] == 0).count();
        assert!(inked > 0);
        assert!(out.enumerate_pixels().all(|(_, y, p)| p[0] != 0 || y < 50));
    }

    #[test]
    fn test_small_region_is_skipped() {
        let page = gray_page(100, 100);
        let region = region_with_translation(&page, (5, 5, 12, 40), "HI");
        let out = renderer().render(&page, &[region]);
        assert_eq!(out, page);
    }

    #[test]
    fn test_background_is_flat_fill() {
        let page = gray_page(100, 100);
        let region = region_with_translation(&page, (20, 20, 50, 30), "");
        let out = renderer().render(&page, &[region]);
        assert_eq!(out.get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(69, 49), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(70, 50), &Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_render_page_checks_size() {
        let page = gray_page(100, 100);
        let regions = PageRegions {
            page_index: 3,
            width: 120,
            height: 100,
            regions: Vec::new(),
        };
        let err = renderer().render_page(&page, &regions).unwrap_err();
        assert!(matches!(err, RenderingError::PageSizeMismatch { page_index: 3, .. }));
    }

    #[test]
    fn test_region_text_color_needs_contrast() {
        let mut config = RenderingConfig::default();
        config.text_color_from_region = true;
        let renderer = LayoutRenderer::new(&config, Arc::new(BlockGlyphBackend::default()));
        let page = gray_page(100, 100);

        let mut dark = region_with_translation(&page, (0, 0, 50, 30), "A");
        dark.color = [20, 30, 200];
        assert_eq!(renderer.text_color_for(&dark), Rgba([20, 30, 200, 255]));

        let mut light = region_with_translation(&page, (0, 0, 50, 30), "A");
        light.color = [240, 240, 240];
        assert_eq!(renderer.text_color_for(&light), Rgba([0, 0, 0, 255]));
    }
}
