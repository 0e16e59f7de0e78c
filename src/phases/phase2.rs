// Phase 2: Translation

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::errors::{PipelineResult, RegionErrorContext};
use crate::core::language::Language;
use crate::core::types::PageRegions;
use crate::orchestration::fallback::{FallbackAction, FallbackPolicy};
use crate::services::translation::Translator;
use crate::utils::metrics::Metrics;

/// Phase 2 pipeline: translate the extracted text of each region
pub struct Phase2Pipeline {
    translator: Arc<dyn Translator>,
    policy: FallbackPolicy,
    metrics: Metrics,
}

impl Phase2Pipeline {
    pub fn new(translator: Arc<dyn Translator>, policy: FallbackPolicy, metrics: Metrics) -> Self {
        Self {
            translator,
            policy,
            metrics,
        }
    }

    /// Translate every region of one page in place, one call at a time
    #[instrument(skip(self, page), fields(page_index = page.page_index, regions = page.regions.len()))]
    pub async fn execute(&self, page: &mut PageRegions, source: Language, target: Language) -> PipelineResult<()> {
        let page_index = page.page_index;
        let mut fallbacks = 0usize;

        for (region_index, region) in page.regions.iter_mut().enumerate() {
            match self.translator.translate(&region.text, source, target).await {
                Ok(translated) => region.translated_text = translated,
                Err(e) => match self.policy.for_translation(&e) {
                    FallbackAction::KeepSource => {
                        warn!(
                            "Keeping source text for region {} on page {}: {}",
                            region_index, page_index, e
                        );
                        region.translated_text = region.text.clone();
                        self.metrics.record_translation_fallback();
                        fallbacks += 1;
                    }
                    FallbackAction::DropRegion | FallbackAction::Fail => {
                        return Err(e).with_region_context(page_index, region_index);
                    }
                },
            }
        }

        debug!(
            "Phase 2: translated {} regions on page {} ({} kept source)",
            page.regions.len(),
            page_index,
            fallbacks
        );
        Ok(())
    }

    /// Let the translator persist any buffered state. Failures only warn.
    pub async fn finish(&self) {
        if let Err(e) = self.translator.flush().await {
            warn!("Translator {} flush failed: {:#}", self.translator.name(), e);
        }
    }
}
