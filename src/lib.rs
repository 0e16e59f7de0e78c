// Library exports for the manga page translator
//
// core: config, errors, job record, shared types
// services: detection, extraction, translation, rendering, storage, documents
// phases: one pipeline per job stage
// orchestration: job pipeline, repository, checkpoints, worker

pub mod core;
pub mod orchestration;
pub mod phases;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        ConfigError, DocumentError, ExtractionError, PipelineError, RenderingError, ServiceError,
        StorageError, TranslationError,
    },
    job::{Job, JobSnapshot, JobStatus, Stage},
    language::{languages, Language},
    types::{BoundingBox, DocumentKind, FileRef, JobId, PageRegions, Region},
};

pub use orchestration::{
    FileJobRepository, InMemoryJobRepository, JobPipeline, JobRepository, JobWorker, PipelineParts,
};

pub use services::{
    build_extractor, build_translator, CosmicTextBackend, LayoutRenderer, LocalStorage, RegionDetector,
    StorageAdapter, TextBackend, TextExtractor, Translator,
};

pub use utils::{Metrics, MetricsSnapshot};
