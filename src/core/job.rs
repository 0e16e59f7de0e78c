// Job record and its state machine
//
// Pending -> Processing -> {Completed, Failed}. Progress only moves forward
// and nothing changes once a terminal state is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::JobStateError;
use crate::core::language::Language;
use crate::core::types::{DocumentKind, FileRef, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Detection and text extraction
    Extraction,
    Translation,
    Rendering,
}

impl Stage {
    pub const FIRST: Stage = Stage::Extraction;

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Extraction => Some(Stage::Translation),
            Stage::Translation => Some(Stage::Rendering),
            Stage::Rendering => None,
        }
    }

    /// Progress recorded when the stage starts
    pub fn entry_progress(self) -> u8 {
        match self {
            Stage::Extraction => 10,
            Stage::Translation => 50,
            Stage::Rendering => 80,
        }
    }

    /// Progress recorded once the stage output is committed
    pub fn exit_progress(self) -> u8 {
        match self {
            Stage::Extraction => 40,
            Stage::Translation => 70,
            Stage::Rendering => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Translation => "translation",
            Stage::Rendering => "rendering",
        }
    }
}

/// Integer percentage in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Persisted record tracking one document through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    progress: Progress,
    source_language: Language,
    target_language: Language,
    original_filename: String,
    document_kind: DocumentKind,
    page_count: usize,
    original_file_ref: Option<FileRef>,
    result_file_ref: Option<FileRef>,
    error_message: Option<String>,
    completed_stage: Option<Stage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Bumped by the repository on every accepted write
    #[serde(default)]
    revision: u64,
}

impl Job {
    pub fn new(
        id: JobId,
        source_language: Language,
        target_language: Language,
        original_filename: impl Into<String>,
        document_kind: DocumentKind,
        page_count: usize,
        original_file_ref: FileRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: Progress::default(),
            source_language,
            target_language,
            original_filename: original_filename.into(),
            document_kind,
            page_count,
            original_file_ref: Some(original_file_ref),
            result_file_ref: None,
            error_message: None,
            completed_stage: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn source_language(&self) -> Language {
        self.source_language
    }

    pub fn target_language(&self) -> Language {
        self.target_language
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn document_kind(&self) -> DocumentKind {
        self.document_kind
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn original_file_ref(&self) -> Option<&FileRef> {
        self.original_file_ref.as_ref()
    }

    pub fn result_file_ref(&self) -> Option<&FileRef> {
        self.result_file_ref.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn completed_stage(&self) -> Option<Stage> {
        self.completed_stage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Revision of the stored record this copy was read from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// The stage `advance` would run next, `None` once terminal
    pub fn next_stage(&self) -> Option<Stage> {
        if self.status.is_terminal() {
            return None;
        }
        match self.completed_stage {
            None => Some(Stage::FIRST),
            Some(stage) => stage.next(),
        }
    }

    fn ensure_active(&self) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            return Err(JobStateError::Terminal {
                job_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStateError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Pending -> Processing; a no-op when already processing
    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.ensure_active()?;
        if self.status == JobStatus::Processing {
            return Ok(());
        }
        self.transition(JobStatus::Processing)
    }

    /// Raise progress; lower values are ignored
    pub fn raise_progress(&mut self, percent: u8) -> Result<(), JobStateError> {
        self.ensure_active()?;
        let next = Progress::new(percent);
        if next > self.progress {
            self.progress = next;
            self.touch();
        }
        Ok(())
    }

    /// Record that `stage` committed its output
    pub fn complete_stage(&mut self, stage: Stage) -> Result<(), JobStateError> {
        self.ensure_active()?;
        if self.next_stage() != Some(stage) {
            return Err(JobStateError::OutOfOrder {
                job_id: self.id,
                expected: self.next_stage(),
                got: stage,
            });
        }
        self.completed_stage = Some(stage);
        self.raise_progress(stage.exit_progress())
    }

    /// Processing -> Completed with the persisted result
    pub fn complete(&mut self, result_file_ref: FileRef) -> Result<(), JobStateError> {
        self.ensure_active()?;
        if self.completed_stage != Some(Stage::Rendering) {
            return Err(JobStateError::OutOfOrder {
                job_id: self.id,
                expected: self.next_stage(),
                got: Stage::Rendering,
            });
        }
        self.transition(JobStatus::Completed)?;
        self.result_file_ref = Some(result_file_ref);
        self.progress = Progress::new(100);
        Ok(())
    }

    /// -> Failed; progress stays where it was
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobStateError> {
        self.ensure_active()?;
        if self.status == JobStatus::Pending {
            self.transition(JobStatus::Processing)?;
        }
        let message = message.into();
        self.error_message = Some(if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
        self.transition(JobStatus::Failed)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            status: self.status,
            progress: self.progress.value(),
            error_message: self.error_message.clone(),
            result_ref: self.result_file_ref.clone(),
        }
    }
}

/// Read-only view returned by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<FileRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job() -> Job {
        Job::new(
            JobId::new(),
            Language::Japanese,
            Language::English,
            "page.png",
            DocumentKind::Image,
            1,
            FileRef::new("uploads/x.png"),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = pending_job();
        assert_eq!(job.next_stage(), Some(Stage::Extraction));

        job.start().unwrap();
        assert_eq!(job.status(), JobStatus::Processing);

        job.complete_stage(Stage::Extraction).unwrap();
        assert_eq!(job.progress().value(), 40);
        job.complete_stage(Stage::Translation).unwrap();
        assert_eq!(job.progress().value(), 70);
        job.complete_stage(Stage::Rendering).unwrap();
        job.complete(FileRef::new("results/x.png")).unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.progress().value(), 100);
        assert_eq!(job.next_stage(), None);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = pending_job();
        job.start().unwrap();
        job.raise_progress(50).unwrap();
        job.raise_progress(20).unwrap();
        assert_eq!(job.progress().value(), 50);
        job.raise_progress(250).unwrap();
        assert_eq!(job.progress().value(), 100);
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut job = pending_job();
        job.start().unwrap();
        job.raise_progress(40).unwrap();
        job.fail("translator unavailable").unwrap();

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.progress().value(), 40);
        assert!(job.start().is_err());
        assert!(job.raise_progress(90).is_err());
        assert!(job.fail("again").is_err());
        assert!(job.complete(FileRef::new("r")).is_err());
        assert_eq!(job.error_message(), Some("translator unavailable"));
    }

    #[test]
    fn test_stages_must_run_in_order() {
        let mut job = pending_job();
        job.start().unwrap();
        assert!(job.complete_stage(Stage::Translation).is_err());
        assert!(job.complete(FileRef::new("r")).is_err());
        job.complete_stage(Stage::Extraction).unwrap();
        assert!(job.complete_stage(Stage::Extraction).is_err());
    }

    #[test]
    fn test_failed_job_always_has_message() {
        let mut job = pending_job();
        job.fail("  ").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(!job.error_message().unwrap().is_empty());
    }

    #[test]
    fn test_status_transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
    }
}
