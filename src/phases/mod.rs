// Stage pipelines, one per job stage
//
// Phase 1: detection + extraction
// Phase 2: translation
// Phase 3: rendering + document assembly

pub mod phase1;
pub mod phase2;
pub mod phase3;

pub use phase1::Phase1Pipeline;
pub use phase2::Phase2Pipeline;
pub use phase3::Phase3Pipeline;
