pub mod detection;
pub mod document;
pub mod extraction;
pub mod pdf;
pub mod rendering;
pub mod storage;
pub mod translation;

// Re-export commonly used services
pub use detection::RegionDetector;
pub use document::{decode_document, encode_document, Document, Page};
pub use extraction::{build_extractor, NoopExtractor, TesseractExtractor, TextExtraction, TextExtractor};
pub use rendering::{CosmicTextBackend, LayoutRenderer, TextBackend};
pub use storage::{LocalStorage, StorageAdapter};
pub use translation::{
    build_translator, CachedTranslator, HttpTranslator, IdentityTranslator, TranslationCache,
    Translator,
};
