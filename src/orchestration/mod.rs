pub mod checkpoint;
pub mod fallback;
pub mod pipeline;
pub mod repository;
pub mod worker;

pub use checkpoint::WorkDirs;
pub use fallback::{FallbackAction, FallbackPolicy};
pub use pipeline::{JobPipeline, PipelineParts};
pub use repository::{FileJobRepository, InMemoryJobRepository, JobRepository};
pub use worker::JobWorker;
