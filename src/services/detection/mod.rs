// Region detection: binarize, close gaps with morphology, take external
// contours and keep boxes of plausible text size.

use image::{DynamicImage, GrayImage, RgbaImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::core::config::DetectionConfig;
use crate::core::types::{BoundingBox, Region};

/// Ratio of box height used as the initial font size guess
const FONT_SIZE_HINT_RATIO: f32 = 0.7;
const MIN_FONT_SIZE_HINT: u32 = 10;

pub struct RegionDetector {
    config: DetectionConfig,
}

impl RegionDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Find candidate text regions on a page.
    ///
    /// Every returned box lies inside the page, is at least
    /// `min_width` x `min_height` before padding and is ordered
    /// top-to-bottom, then left-to-right. Blank pages give an empty list.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Vec<Region> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mask = self.text_mask(&image.to_luma8());
        let mut boxes: Vec<BoundingBox> = find_contours::<u32>(&mask)
            .iter()
            .filter(|contour| contour.parent.is_none())
            .filter_map(|contour| contour_bounds(contour, width, height))
            .filter(|bbox| self.plausible_size(bbox, width, height))
            .map(|bbox| bbox.padded(self.config.padding, width, height))
            .collect();

        boxes.sort_by_key(|bbox| (bbox.y(), bbox.x()));

        let rgba = image.to_rgba8();
        let regions: Vec<Region> = boxes
            .par_iter()
            .map(|bbox| build_region(&rgba, *bbox))
            .collect();

        debug!("Detected {} regions", regions.len());
        regions
    }

    /// Foreground mask: dark pixels, grown into blobs then shrunk back
    fn text_mask(&self, gray: &GrayImage) -> GrayImage {
        let binary = threshold(gray, self.config.binary_threshold, ThresholdType::BinaryInverted);

        // Repeating a k x k square n times equals one L-inf pass of radius n * (k / 2)
        let radius = self.config.kernel_size / 2;
        let grow = radius.saturating_mul(self.config.dilate_iterations).min(u8::MAX as u32) as u8;
        let shrink = radius.saturating_mul(self.config.erode_iterations).min(u8::MAX as u32) as u8;

        let dilated = if grow > 0 { dilate(&binary, Norm::LInf, grow) } else { binary };
        if shrink > 0 {
            erode(&dilated, Norm::LInf, shrink)
        } else {
            dilated
        }
    }

    fn plausible_size(&self, bbox: &BoundingBox, width: u32, height: u32) -> bool {
        let max_w = width as f32 * self.config.max_fraction;
        let max_h = height as f32 * self.config.max_fraction;

        bbox.width() >= self.config.min_width
            && bbox.height() >= self.config.min_height
            && (bbox.width() as f32) <= max_w
            && (bbox.height() as f32) <= max_h
    }
}

/// Axis-aligned bounds of a contour's points
fn contour_bounds(contour: &Contour<u32>, width: u32, height: u32) -> Option<BoundingBox> {
    let mut points = contour.points.iter();
    let first = points.next()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox::within(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1, width, height)
}

fn build_region(page: &RgbaImage, bbox: BoundingBox) -> Region {
    let crop = image::imageops::crop_imm(page, bbox.x(), bbox.y(), bbox.width(), bbox.height())
        .to_image();
    let color = mean_color(&crop);
    let font_hint = ((bbox.height() as f32 * FONT_SIZE_HINT_RATIO).floor() as u32).max(MIN_FONT_SIZE_HINT);
    Region::new(bbox, crop, color, font_hint)
}

/// Mean RGB of an image, white when empty
pub fn mean_color(image: &RgbaImage) -> [u8; 3] {
    let count = (image.width() as u64) * (image.height() as u64);
    if count == 0 {
        return [255, 255, 255];
    }
    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        sums[0] += pixel[0] as u64;
        sums[1] += pixel[1] as u64;
        sums[2] += pixel[2] as u64;
    }
    [
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{page_with_blobs, white_page};
    use image::{Rgba, RgbaImage};

    fn detector() -> RegionDetector {
        RegionDetector::new(DetectionConfig::default())
    }

    #[test]
    fn test_blank_pages_have_no_regions() {
        let white = white_page(300, 200);
        assert!(detector().detect(&white).is_empty());

        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 200, Rgba([0, 0, 0, 255])));
        assert!(detector().detect(&black).is_empty());
    }

    #[test]
    fn test_separated_blobs_become_regions() {
        let page = page_with_blobs(400, 300, &[(20, 20, 60, 30), (200, 40, 80, 40), (60, 200, 120, 50)]);
        let regions = detector().detect(&page);
        assert_eq!(regions.len(), 3);

        // Reading order
        let tops: Vec<u32> = regions.iter().map(|r| r.bbox().y()).collect();
        let mut sorted = tops.clone();
        sorted.sort();
        assert_eq!(tops, sorted);
    }

    #[test]
    fn test_boxes_inside_page_and_large_enough() {
        let config = DetectionConfig::default();
        // One blob touches the page corner, one is too small to keep
        let page = page_with_blobs(300, 300, &[(0, 0, 50, 40), (150, 150, 4, 4), (120, 60, 90, 40)]);
        let regions = detector().detect(&page);
        assert_eq!(regions.len(), 2);

        for region in &regions {
            let b = region.bbox();
            assert!(b.right() <= 300 && b.bottom() <= 300);
            assert!(b.width() >= config.min_width && b.height() >= config.min_height);
            assert!(!b.contains(152, 152));
            let crop = region.crop().unwrap();
            assert_eq!((crop.width(), crop.height()), (b.width(), b.height()));
        }
    }

    #[test]
    fn test_region_hints() {
        let page = page_with_blobs(300, 300, &[(100, 100, 80, 40)]);
        let regions = detector().detect(&page);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert!(region.estimated_font_size >= MIN_FONT_SIZE_HINT);
        // Mostly black blob on white padding
        assert!(region.color[0] < 128);
    }

    #[test]
    fn test_mean_color() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        assert_eq!(mean_color(&img), [100, 50, 25]);
        assert_eq!(mean_color(&RgbaImage::new(0, 0)), [255, 255, 255]);
    }
}
