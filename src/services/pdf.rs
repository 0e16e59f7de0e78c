// PDF documents through pdfium: each page is rasterized independently on
// input, and each rendered page becomes one full-page image on output.

use image::{DynamicImage, RgbaImage};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use super::document::Page;
use crate::core::errors::DocumentError;

/// Directory holding the pdfium shared library. The system library search
/// path is used when unset.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Resolution pages are rasterized at
pub const RASTER_DPI: f32 = 200.0;

/// Resolution recorded in the result; each page keeps its pixel size
pub const OUTPUT_DPI: f32 = 100.0;

const POINTS_PER_INCH: f32 = 72.0;

/// Global pdfium binding, created on first use
static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

pub fn pdfium() -> Result<&'static Pdfium, DocumentError> {
    PDFIUM.get_or_try_init(|| {
        let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
            Ok(path) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path)),
            Err(_) => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| DocumentError::PdfUnavailable(e.to_string()))?;

        info!("✓ pdfium bound");
        Ok(Pdfium::new(bindings))
    })
}

/// Rasterize every page, in document order
pub fn decode_pdf(bytes: &[u8]) -> Result<Vec<Page>, DocumentError> {
    let document = pdfium()?.load_pdf_from_byte_slice(bytes, None)?;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(RASTER_DPI / POINTS_PER_INCH);

    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let image = page.render_with_config(&render_config)?.as_image().into_rgba8();
        debug!("Rasterized PDF page {} at {}x{}", index, image.width(), image.height());
        pages.push(Page {
            name: format!("page {}", index + 1),
            image,
        });
    }

    if pages.is_empty() {
        return Err(DocumentError::EmptyPdf);
    }
    Ok(pages)
}

/// One PDF page per image, sized so the image fills it at [`OUTPUT_DPI`]
pub fn encode_pdf(pages: &[RgbaImage]) -> Result<Vec<u8>, DocumentError> {
    if pages.is_empty() {
        return Err(DocumentError::EmptyPdf);
    }

    let mut document = pdfium()?.create_new_pdf()?;
    for image in pages {
        let width = PdfPoints::new(image.width() as f32 * POINTS_PER_INCH / OUTPUT_DPI);
        let height = PdfPoints::new(image.height() as f32 * POINTS_PER_INCH / OUTPUT_DPI);

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))?;
        page.objects_mut().create_image_object(
            PdfPoints::ZERO,
            PdfPoints::ZERO,
            &DynamicImage::ImageRgba8(image.clone()),
            Some(width),
            Some(height),
        )?;
    }

    Ok(document.save_to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn pdfium_available() -> bool {
        match pdfium() {
            Ok(_) => true,
            Err(e) => {
                eprintln!("pdfium not available, skipping: {}", e);
                false
            }
        }
    }

    fn close(a: &Rgba<u8>, b: [u8; 3]) -> bool {
        (0..3).all(|i| (a[i] as i32 - b[i] as i32).abs() <= 8)
    }

    #[test]
    fn test_pages_round_trip_in_order() {
        if !pdfium_available() {
            return;
        }
        let red = RgbaImage::from_pixel(100, 60, Rgba([220, 30, 30, 255]));
        let blue = RgbaImage::from_pixel(50, 80, Rgba([30, 30, 220, 255]));

        let bytes = encode_pdf(&[red, blue]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let pages = decode_pdf(&bytes).unwrap();
        assert_eq!(pages.len(), 2);

        // Rasterized at twice the output resolution
        let scale = RASTER_DPI / OUTPUT_DPI;
        let first = &pages[0].image;
        assert!((first.width() as f32 - 100.0 * scale).abs() <= 2.0);
        assert!((first.height() as f32 - 60.0 * scale).abs() <= 2.0);
        assert!(close(first.get_pixel(first.width() / 2, first.height() / 2), [220, 30, 30]));

        let second = &pages[1].image;
        assert!(second.height() > second.width());
        assert!(close(second.get_pixel(second.width() / 2, second.height() / 2), [30, 30, 220]));
    }

    #[test]
    fn test_broken_pdf_is_an_error() {
        if !pdfium_available() {
            return;
        }
        assert!(decode_pdf(b"%PDF-1.7\nnot really a pdf").is_err());
    }

    #[test]
    fn test_no_pages_to_encode() {
        assert!(matches!(encode_pdf(&[]), Err(DocumentError::EmptyPdf)));
    }
}
