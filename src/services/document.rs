// Document codec: a single raster image, a comic-book archive (zip) of
// page images, or a PDF. Results keep the input's page count and order.

use image::RgbaImage;
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::pdf::{decode_pdf, encode_pdf};
use crate::core::errors::DocumentError;
use crate::core::types::DocumentKind;
use crate::utils::{decode_rgba, encode_png};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PDF_MAGIC: &[u8] = b"%PDF-";
const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "tif", "tiff"];

/// One decoded page
#[derive(Debug, Clone)]
pub struct Page {
    pub name: String,
    pub image: RgbaImage,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocumentKind,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

pub fn sniff_kind(bytes: &[u8]) -> DocumentKind {
    if bytes.starts_with(ZIP_MAGIC) {
        DocumentKind::Archive
    } else if bytes.starts_with(PDF_MAGIC) {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    }
}

/// Decode uploaded bytes into pages. `name` is only used in error messages.
pub fn decode_document(name: &str, bytes: &[u8]) -> Result<Document, DocumentError> {
    match sniff_kind(bytes) {
        DocumentKind::Image => {
            let image = decode_rgba(bytes).map_err(|source| DocumentError::Undecodable {
                name: name.to_string(),
                source,
            })?;
            Ok(Document {
                kind: DocumentKind::Image,
                pages: vec![Page {
                    name: name.to_string(),
                    image,
                }],
            })
        }
        DocumentKind::Archive => Ok(Document {
            kind: DocumentKind::Archive,
            pages: decode_archive(bytes)?,
        }),
        DocumentKind::Pdf => Ok(Document {
            kind: DocumentKind::Pdf,
            pages: decode_pdf(bytes)?,
        }),
    }
}

fn is_page_entry(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if file_name.starts_with('.') || name.starts_with("__MACOSX/") {
        return false;
    }
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Pages are ordered by entry name
fn decode_archive(bytes: &[u8]) -> Result<Vec<Page>, DocumentError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() || !is_page_entry(file.name()) {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        entries.push((name, data));
    }

    if entries.is_empty() {
        return Err(DocumentError::EmptyArchive);
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    entries
        .into_iter()
        .map(|(name, data)| {
            let image = decode_rgba(&data).map_err(|source| DocumentError::Undecodable {
                name: name.clone(),
                source,
            })?;
            Ok(Page { name, image })
        })
        .collect()
}

/// Encode rendered pages in the same shape as the input
pub fn encode_document(kind: DocumentKind, pages: &[RgbaImage]) -> Result<Vec<u8>, DocumentError> {
    match kind {
        DocumentKind::Image => {
            let page = pages.first().ok_or(DocumentError::EmptyArchive)?;
            Ok(encode_png(page)?)
        }
        DocumentKind::Archive => {
            if pages.is_empty() {
                return Err(DocumentError::EmptyArchive);
            }
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            // PNG data is already compressed
            let options = FileOptions::default().compression_method(CompressionMethod::Stored);

            for (index, page) in pages.iter().enumerate() {
                writer.start_file(page_entry_name(index), options)?;
                writer.write_all(&encode_png(page)?)?;
            }

            Ok(writer.finish()?.into_inner())
        }
        DocumentKind::Pdf => encode_pdf(pages),
    }
}

pub fn page_entry_name(index: usize) -> String {
    format!("page_{:04}.png", index)
}
