// Phase 3: Rendering + document assembly

use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::errors::{ErrorContext, PipelineResult};
use crate::core::types::{DocumentKind, PageRegions};
use crate::services::document::encode_document;
use crate::services::rendering::LayoutRenderer;
use crate::utils::image_ops::spawn_image_task;
use crate::utils::metrics::Metrics;

/// Phase 3 pipeline: typeset translations back onto the pages
pub struct Phase3Pipeline {
    renderer: Arc<LayoutRenderer>,
    metrics: Metrics,
}

impl Phase3Pipeline {
    pub fn new(renderer: Arc<LayoutRenderer>, metrics: Metrics) -> Self {
        Self { renderer, metrics }
    }

    /// Render one page on a blocking worker
    #[instrument(skip(self, page, regions), fields(page_index = regions.page_index, regions = regions.regions.len()))]
    pub async fn execute(&self, page: RgbaImage, regions: PageRegions) -> PipelineResult<RgbaImage> {
        let renderer = Arc::clone(&self.renderer);
        let page_index = regions.page_index;
        let region_count = regions.regions.len();

        let rendered =
            spawn_image_task(move || renderer.render_page(&page, &regions).with_page_context(page_index)).await?;

        self.metrics.record_regions_rendered(region_count);
        debug!("Phase 3: rendered page {}", page_index);
        Ok(rendered)
    }

    /// Encode rendered pages in the shape of the input document
    pub async fn assemble(&self, kind: DocumentKind, pages: Vec<RgbaImage>) -> PipelineResult<Vec<u8>> {
        let page_count = pages.len();
        let bytes = spawn_image_task(move || Ok(encode_document(kind, &pages)?)).await?;
        debug!("Phase 3: assembled {} page(s) into {} bytes", page_count, bytes.len());
        Ok(bytes)
    }
}
