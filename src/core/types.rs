// Shared value types flowing between pipeline stages

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier, assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Opaque reference to a file held by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape of the submitted document, which also decides the result format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// One raster image; result is a PNG
    Image,
    /// Comic-book archive of pages; result is a CBZ with the same pages
    Archive,
    /// PDF rasterized page by page; result is a PDF with the same pages
    Pdf,
}

impl DocumentKind {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Image => "png",
            DocumentKind::Archive => "cbz",
            DocumentKind::Pdf => "pdf",
        }
    }
}

/// Axis-aligned box in page pixel coordinates, origin top-left.
///
/// Can only be constructed inside the bounds of a concrete image, so every
/// box held by a [`Region`] satisfies `x + width <= image_width` and
/// `y + height <= image_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    /// Returns `None` for empty boxes or boxes leaving the image
    pub fn within(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let right = x.checked_add(width)?;
        let bottom = y.checked_add(height)?;
        if right > image_width || bottom > image_height {
            return None;
        }
        Some(Self { x, y, width, height })
    }

    /// Grow by `padding` on every side, clamped to the image
    pub fn padded(&self, padding: u32, image_width: u32, image_height: u32) -> Self {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let right = (self.right() + padding).min(image_width);
        let bottom = (self.bottom() + padding).min(image_height);
        Self {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// A detected text-bearing area of a page.
///
/// The box is fixed at detection time. Extraction fills `text` and
/// `confidence`, translation fills `translated_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    bbox: BoundingBox,
    /// Pixels copied out of the page at detection time. Released once the
    /// text has been extracted and never persisted.
    #[serde(skip)]
    crop: Option<RgbaImage>,
    pub text: String,
    confidence: f32,
    pub translated_text: String,
    /// Mean RGB colour of the crop
    pub color: [u8; 3],
    pub estimated_font_size: u32,
}

impl Region {
    pub fn new(bbox: BoundingBox, crop: RgbaImage, color: [u8; 3], estimated_font_size: u32) -> Self {
        Self {
            bbox,
            crop: Some(crop),
            text: String::new(),
            confidence: 0.0,
            translated_text: String::new(),
            color,
            estimated_font_size,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn crop(&self) -> Option<&RgbaImage> {
        self.crop.as_ref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Record the extraction result; confidence is clamped to [0, 100]
    pub fn set_extraction(&mut self, text: impl Into<String>, confidence: f32) {
        self.text = text.into();
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 100.0)
        };
    }

    pub fn release_crop(&mut self) {
        self.crop = None;
    }

    /// Whether the region survives the post-extraction filter
    pub fn is_legible(&self, min_confidence: f32) -> bool {
        !self.text.trim().is_empty() && self.confidence >= min_confidence
    }
}

/// Regions of one page, the unit persisted between stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRegions {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<Region>,
}

impl PageRegions {
    /// Index of the first region whose box is empty or leaves the page.
    ///
    /// Boxes built by detection never do; this catches records read back
    /// from disk.
    pub fn first_out_of_bounds(&self) -> Option<usize> {
        self.regions.iter().position(|region| {
            let b = region.bbox();
            BoundingBox::within(b.x, b.y, b.width, b.height, self.width, self.height).is_none()
        })
    }
}
