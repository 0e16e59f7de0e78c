pub mod tesseract;

use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;
use tracing::info;

use crate::core::config::{ExtractionBackend, ExtractionConfig};
use crate::core::errors::ExtractionResult;
use crate::core::language::Language;

pub use tesseract::TesseractExtractor;

/// Text recognized in one region
#[derive(Debug, Clone, PartialEq)]
pub struct TextExtraction {
    pub text: String,
    /// Provider score in [0, 100]
    pub confidence: f32,
}

impl TextExtraction {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

/// Text recognition capability.
///
/// Empty text is a valid answer for a region with nothing legible in it.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, crop: &RgbaImage, language: Language) -> ExtractionResult<TextExtraction>;
}

/// Designated fallback when no recognizer is configured: reads nothing, so
/// every region is dropped and pages pass through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExtractor;

#[async_trait]
impl TextExtractor for NoopExtractor {
    fn name(&self) -> &str {
        "none"
    }

    async fn extract(&self, _crop: &RgbaImage, _language: Language) -> ExtractionResult<TextExtraction> {
        Ok(TextExtraction::empty())
    }
}

pub fn build_extractor(config: &ExtractionConfig) -> Arc<dyn TextExtractor> {
    let extractor: Arc<dyn TextExtractor> = match config.backend {
        ExtractionBackend::None => Arc::new(NoopExtractor),
        ExtractionBackend::Tesseract => Arc::new(TesseractExtractor::new(&config.tesseract_path)),
    };
    info!("Extraction backend: {}", extractor.name());
    extractor
}
