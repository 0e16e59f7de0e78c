// Per-job working directories holding stage checkpoints
//
// Layout: <work_dir>/<job_id>/<stage>.json. A checkpoint is written to a
// temporary file and renamed into place, so a reader sees either the old
// file, the new one, or nothing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::job::Stage;
use crate::core::types::JobId;

#[derive(Debug, Clone)]
pub struct WorkDirs {
    root: PathBuf,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn checkpoint_path(&self, job_id: JobId, stage: Stage) -> PathBuf {
        self.job_dir(job_id).join(format!("{}.json", stage.as_str()))
    }

    /// Persist the output of `stage`
    pub async fn save<T: Serialize>(&self, job_id: JobId, stage: Stage, value: &T) -> PipelineResult<()> {
        let fail = |reason: String| PipelineError::Checkpoint { stage, reason };

        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| fail(format!("cannot create {}: {}", dir.display(), e)))?;

        let data = serde_json::to_vec(value).map_err(|e| fail(e.to_string()))?;
        let path = self.checkpoint_path(job_id, stage);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| fail(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| fail(format!("cannot commit {}: {}", path.display(), e)))?;

        debug!("Checkpoint {} saved ({} bytes)", path.display(), data.len());
        Ok(())
    }

    /// Read the output of `stage`; a missing file is an error
    pub async fn load<T: DeserializeOwned>(&self, job_id: JobId, stage: Stage) -> PipelineResult<T> {
        let path = self.checkpoint_path(job_id, stage);
        let data = tokio::fs::read(&path).await.map_err(|e| PipelineError::Checkpoint {
            stage,
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_slice(&data).map_err(|e| PipelineError::Checkpoint {
            stage,
            reason: format!("corrupt {}: {}", path.display(), e),
        })
    }

    /// Remove the job's working directory. Errors only warn.
    pub async fn cleanup(&self, job_id: JobId) {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed work dir {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove work dir {}: {}", dir.display(), e),
        }
    }
}
