// Error types for every pipeline component
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation (page and region indices)
// - Type-safe error matching for the fallback policy
// - Source error chaining

use thiserror::Error;

use crate::core::job::{JobStatus, Stage};
use crate::core::types::JobId;

/// Text extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The backend cannot run at all (missing binary, crashed process)
    #[error("Extraction backend unavailable: {0}")]
    Unavailable(String),

    /// The backend ran but could not read this region
    #[error("Region unreadable: {reason}")]
    Unreadable { reason: String },

    #[error("Failed to encode region image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Translation errors
#[derive(Debug, Error)]
pub enum TranslationError {
    /// Provider down or unreachable; always fails the job
    #[error("Translation provider unavailable: {0}")]
    Unavailable(String),

    /// Provider refused this input; subject to the fallback policy
    #[error("Translation rejected: {reason}")]
    Rejected { reason: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_client_error() => TranslationError::Rejected {
                reason: err.to_string(),
            },
            _ if err.is_decode() => TranslationError::InvalidResponse(err.to_string()),
            _ => TranslationError::Unavailable(err.to_string()),
        }
    }
}

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Image processing failed: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Page {page_index} has no extraction data")]
    MissingPage { page_index: usize },

    #[error("Page {page_index} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    PageSizeMismatch {
        page_index: usize,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage I/O failed for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Document decoding/encoding errors
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Undecodable image '{name}': {source}")]
    Undecodable {
        name: String,
        source: image::ImageError,
    },

    #[error("Archive contains no pages")]
    EmptyArchive,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("PDF contains no pages")]
    EmptyPdf,

    #[error("PDF support unavailable: {0}")]
    PdfUnavailable(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] pdfium_render::prelude::PdfiumError),

    #[error("Document I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Job repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    Duplicate(JobId),

    /// The stored record moved on since this copy was read
    #[error("Job {job_id} changed concurrently (read revision {expected}, stored {found})")]
    Conflict { job_id: JobId, expected: u64, found: u64 },

    #[error("Repository I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Illegal job mutations
#[derive(Debug, Error)]
pub enum JobStateError {
    #[error("Job {job_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} is terminal ({status:?})")]
    Terminal { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} expected stage {expected:?}, got {got:?}")]
    OutOfOrder {
        job_id: JobId,
        expected: Option<Stage>,
        got: Stage,
    },
}

/// Stage-level failures. The Display text becomes the job's error message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction failed for region {region_index} on page {page_index}: {source}")]
    Extraction {
        page_index: usize,
        region_index: usize,
        #[source]
        source: ExtractionError,
    },

    #[error("Translation failed for region {region_index} on page {page_index}: {source}")]
    Translation {
        page_index: usize,
        region_index: usize,
        #[source]
        source: TranslationError,
    },

    #[error("Rendering failed on page {page_index}: {source}")]
    Rendering {
        page_index: usize,
        #[source]
        source: RenderingError,
    },

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Checkpoint for {stage:?} unavailable: {reason}")]
    Checkpoint { stage: Stage, reason: String },

    #[error("Job has no original file")]
    MissingOriginal,

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Errors surfaced by submit / advance / status
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DocumentError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    JobState(#[from] JobStateError),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid extraction config: {0}")]
    InvalidExtractionConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Invalid rendering config: {0}")]
    InvalidRenderingConfig(String),

    #[error("Confidence threshold must be in [0, 100], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Concurrency limit must be > 0, got {0}")]
    InvalidConcurrency(usize),

    #[error("Unknown backend '{value}' for {setting}")]
    UnknownBackend { setting: &'static str, value: String },
}

// Convenience type aliases for Results
pub type ExtractionResult<T> = Result<T, ExtractionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type RepositoryResult<T> = Result<T, RepositoryError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Attach page/region context to component errors
pub trait ErrorContext<T> {
    fn with_page_context(self, page_index: usize) -> PipelineResult<T>;
}

pub trait RegionErrorContext<T> {
    fn with_region_context(self, page_index: usize, region_index: usize) -> PipelineResult<T>;
}

impl<T> ErrorContext<T> for RenderingResult<T> {
    fn with_page_context(self, page_index: usize) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Rendering { page_index, source })
    }
}

impl<T> RegionErrorContext<T> for ExtractionResult<T> {
    fn with_region_context(self, page_index: usize, region_index: usize) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Extraction {
            page_index,
            region_index,
            source,
        })
    }
}

impl<T> RegionErrorContext<T> for TranslationResult<T> {
    fn with_region_context(self, page_index: usize, region_index: usize) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Translation {
            page_index,
            region_index,
            source,
        })
    }
}
