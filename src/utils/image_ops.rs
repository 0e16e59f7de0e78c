use image::{ImageFormat, ImageResult, RgbaImage};
use std::io::Cursor;

use crate::core::errors::{PipelineError, PipelineResult};

/// Run CPU-heavy image work (decode, render, encode) on the blocking pool
pub async fn spawn_image_task<F, T>(task: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
}

/// Encode an RGBA image as PNG bytes
pub fn encode_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Decode an image into RGBA
pub fn decode_rgba(bytes: &[u8]) -> ImageResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
