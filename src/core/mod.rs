pub mod config;
pub mod errors;
pub mod job;
pub mod language;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, DocumentError, ExtractionError, JobStateError, PipelineError,
    RenderingError, RepositoryError, ServiceError, StorageError, TranslationError,
};
pub use job::{Job, JobSnapshot, JobStatus, Progress, Stage};
pub use language::{languages, Language};
pub use types::{BoundingBox, DocumentKind, FileRef, JobId, PageRegions, Region};
