// Phase 1: Region detection + text extraction

use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::errors::{PipelineResult, RegionErrorContext};
use crate::core::language::Language;
use crate::core::types::PageRegions;
use crate::orchestration::fallback::{FallbackAction, FallbackPolicy};
use crate::services::detection::RegionDetector;
use crate::services::extraction::TextExtractor;
use crate::utils::image_ops::spawn_image_task;
use crate::utils::metrics::Metrics;

/// Phase 1 pipeline: find text regions on a page and read them
pub struct Phase1Pipeline {
    detector: Arc<RegionDetector>,
    extractor: Arc<dyn TextExtractor>,
    policy: FallbackPolicy,
    min_confidence: f32,
    metrics: Metrics,
}

impl Phase1Pipeline {
    pub fn new(
        detector: Arc<RegionDetector>,
        extractor: Arc<dyn TextExtractor>,
        policy: FallbackPolicy,
        min_confidence: f32,
        metrics: Metrics,
    ) -> Self {
        Self {
            detector,
            extractor,
            policy,
            min_confidence,
            metrics,
        }
    }

    /// Detect and extract every region of one page.
    ///
    /// Regions are read one at a time in reading order. Unreadable regions
    /// follow the fallback policy, and regions with empty text or low
    /// confidence are dropped. Crops are released before returning.
    #[instrument(skip(self, page), fields(width = page.width(), height = page.height()))]
    pub async fn execute(
        &self,
        page_index: usize,
        page: &RgbaImage,
        language: Language,
    ) -> PipelineResult<PageRegions> {
        let detector = Arc::clone(&self.detector);
        let image = DynamicImage::ImageRgba8(page.clone());
        let detected = spawn_image_task(move || Ok(detector.detect(&image))).await?;
        let detected_count = detected.len();
        self.metrics.record_regions_detected(detected_count);
        debug!("Phase 1: {} regions detected on page {}", detected_count, page_index);

        let mut regions = Vec::with_capacity(detected_count);
        for (region_index, mut region) in detected.into_iter().enumerate() {
            let Some(crop) = region.crop() else {
                continue;
            };

            match self.extractor.extract(crop, language).await {
                Ok(extraction) => {
                    region.set_extraction(extraction.text, extraction.confidence);
                }
                Err(e) => match self.policy.for_extraction(&e) {
                    FallbackAction::DropRegion | FallbackAction::KeepSource => {
                        warn!("Dropping region {} on page {}: {}", region_index, page_index, e);
                        continue;
                    }
                    FallbackAction::Fail => {
                        return Err(e).with_region_context(page_index, region_index);
                    }
                },
            }

            region.release_crop();
            if region.is_legible(self.min_confidence) {
                regions.push(region);
            } else {
                debug!(
                    "Region {} on page {} below threshold (confidence {:.1})",
                    region_index,
                    page_index,
                    region.confidence()
                );
            }
        }

        self.metrics.record_regions_dropped(detected_count - regions.len());
        debug!("Phase 1: kept {}/{} regions on page {}", regions.len(), detected_count, page_index);

        Ok(PageRegions {
            page_index,
            width: page.width(),
            height: page.height(),
            regions,
        })
    }
}
