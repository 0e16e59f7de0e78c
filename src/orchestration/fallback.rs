// Per-error-kind decisions for region-level failures

use crate::core::config::{ExtractionConfig, RejectedPolicy, TranslationConfig, UnreadablePolicy};
use crate::core::errors::{ExtractionError, TranslationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    /// Abort the job
    Fail,
    /// Remove the region from the page and continue
    DropRegion,
    /// Use the extracted text as the translation
    KeepSource,
}

/// Decides how a stage reacts to a collaborator error.
///
/// Unavailable backends always fail the job. Unreadable regions and rejected
/// texts follow the configured policy.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    on_unreadable: FallbackAction,
    on_rejected: FallbackAction,
}

impl FallbackPolicy {
    pub fn from_config(extraction: &ExtractionConfig, translation: &TranslationConfig) -> Self {
        Self {
            on_unreadable: match extraction.on_unreadable {
                UnreadablePolicy::DropRegion => FallbackAction::DropRegion,
                UnreadablePolicy::Fail => FallbackAction::Fail,
            },
            on_rejected: match translation.on_rejected {
                RejectedPolicy::KeepSource => FallbackAction::KeepSource,
                RejectedPolicy::Fail => FallbackAction::Fail,
            },
        }
    }

    pub fn for_extraction(&self, error: &ExtractionError) -> FallbackAction {
        match error {
            ExtractionError::Unreadable { .. } => self.on_unreadable,
            ExtractionError::Unavailable(_) | ExtractionError::Encode(_) => FallbackAction::Fail,
        }
    }

    pub fn for_translation(&self, error: &TranslationError) -> FallbackAction {
        match error {
            TranslationError::Rejected { .. } => self.on_rejected,
            TranslationError::Unavailable(_) | TranslationError::InvalidResponse(_) => FallbackAction::Fail,
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default(), &TranslationConfig::default())
    }
}
