// Job record persistence

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::errors::{RepositoryError, RepositoryResult};
use crate::core::job::Job;
use crate::core::types::JobId;

/// Durable store of job records.
///
/// `update` replaces the whole record, but only if the stored revision is
/// still the one `job` was read at; otherwise it fails with
/// [`RepositoryError::Conflict`] and nothing is written. On success the
/// revision of `job` is bumped to match the stored record.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> RepositoryResult<()>;

    async fn get(&self, job_id: JobId) -> RepositoryResult<Job>;

    async fn update(&self, job: &mut Job) -> RepositoryResult<()>;
}

fn check_revision(stored: &Job, job: &Job) -> RepositoryResult<()> {
    if stored.revision() != job.revision() {
        return Err(RepositoryError::Conflict {
            job_id: job.id(),
            expected: job.revision(),
            found: stored.revision(),
        });
    }
    Ok(())
}

/// Process-local repository
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> RepositoryResult<()> {
        match self.jobs.entry(job.id()) {
            Entry::Occupied(_) => Err(RepositoryError::Duplicate(job.id())),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, job_id: JobId) -> RepositoryResult<Job> {
        self.jobs
            .get(&job_id)
            .map(|job| job.clone())
            .ok_or(RepositoryError::NotFound(job_id))
    }

    async fn update(&self, job: &mut Job) -> RepositoryResult<()> {
        // The shard lock is held from the check to the write
        let mut slot = self
            .jobs
            .get_mut(&job.id())
            .ok_or(RepositoryError::NotFound(job.id()))?;
        check_revision(&slot, job)?;
        job.bump_revision();
        *slot = job.clone();
        Ok(())
    }
}

/// One JSON file per job under a directory.
///
/// Writes are serialized within the process; the revision check does not
/// guard against other processes sharing the directory.
pub struct FileJobRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobRepository {
    pub async fn new(dir: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    async fn write(&self, job: &Job) -> RepositoryResult<()> {
        let path = self.path_for(job.id());
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(job)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Job {} saved ({})", job.id(), job.status().as_str());
        Ok(())
    }

    async fn exists(&self, job_id: JobId) -> RepositoryResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(job_id)).await?)
    }

    async fn read(&self, job_id: JobId) -> RepositoryResult<Job> {
        let data = match tokio::fs::read(self.path_for(job_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(job_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }
}

#[async_trait]
impl JobRepository for FileJobRepository {
    async fn create(&self, job: &Job) -> RepositoryResult<()> {
        let _guard = self.write_lock.lock().await;
        if self.exists(job.id()).await? {
            return Err(RepositoryError::Duplicate(job.id()));
        }
        self.write(job).await
    }

    async fn get(&self, job_id: JobId) -> RepositoryResult<Job> {
        self.read(job_id).await
    }

    async fn update(&self, job: &mut Job) -> RepositoryResult<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read(job.id()).await?;
        check_revision(&stored, job)?;

        let mut next = job.clone();
        next.bump_revision();
        self.write(&next).await?;
        *job = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobStatus;
    use crate::core::language::Language;
    use crate::core::types::{DocumentKind, FileRef};

    fn new_job() -> Job {
        Job::new(
            JobId::new(),
            Language::Japanese,
            Language::English,
            "page.png",
            DocumentKind::Image,
            1,
            FileRef::new("uploads/page.png"),
        )
    }

    async fn exercise(repo: &dyn JobRepository) {
        let mut job = new_job();
        repo.create(&job).await.unwrap();
        assert!(matches!(repo.create(&job).await, Err(RepositoryError::Duplicate(_))));

        job.start().unwrap();
        job.raise_progress(10).unwrap();
        repo.update(&mut job).await.unwrap();
        assert_eq!(job.revision(), 1);

        let loaded = repo.get(job.id()).await.unwrap();
        assert_eq!(loaded.status(), JobStatus::Processing);
        assert_eq!(loaded.progress().value(), 10);
        assert_eq!(loaded.source_language(), Language::Japanese);
        assert_eq!(loaded.revision(), 1);

        let missing = JobId::new();
        assert!(matches!(repo.get(missing).await, Err(RepositoryError::NotFound(id)) if id == missing));
        assert!(matches!(repo.update(&mut new_job()).await, Err(RepositoryError::NotFound(_))));
    }

    async fn exercise_stale_writer(repo: &dyn JobRepository) {
        let mut job = new_job();
        repo.create(&job).await.unwrap();
        job.start().unwrap();
        repo.update(&mut job).await.unwrap();

        // Two readers of the same revision; the first to write wins
        let mut fast = repo.get(job.id()).await.unwrap();
        let mut stale = repo.get(job.id()).await.unwrap();
        fast.raise_progress(40).unwrap();
        fast.fail("done elsewhere").unwrap();
        repo.update(&mut fast).await.unwrap();

        stale.raise_progress(20).unwrap();
        let err = repo.update(&mut stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { expected: 1, found: 2, .. }));
        assert_eq!(stale.revision(), 1);

        let stored = repo.get(job.id()).await.unwrap();
        assert_eq!(stored.status(), JobStatus::Failed);
        assert_eq!(stored.progress().value(), 40);
    }

    #[tokio::test]
    async fn test_in_memory_repository() {
        let repo = InMemoryJobRepository::new();
        exercise(&repo).await;
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_file_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileJobRepository::new(dir.path().join("jobs")).await.unwrap();
        exercise(&repo).await;
    }

    #[tokio::test]
    async fn test_in_memory_rejects_stale_update() {
        exercise_stale_writer(&InMemoryJobRepository::new()).await;
    }

    #[tokio::test]
    async fn test_file_repository_rejects_stale_update() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileJobRepository::new(dir.path()).await.unwrap();
        exercise_stale_writer(&repo).await;
    }

    #[tokio::test]
    async fn test_file_repository_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let job = new_job();
        {
            let repo = FileJobRepository::new(dir.path()).await.unwrap();
            repo.create(&job).await.unwrap();
        }
        let reopened = FileJobRepository::new(dir.path()).await.unwrap();
        assert_eq!(reopened.get(job.id()).await.unwrap().id(), job.id());
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileJobRepository::new(dir.path()).await.unwrap();
        let job_id = JobId::new();
        tokio::fs::write(dir.path().join(format!("{}.json", job_id)), b"{not json")
            .await
            .unwrap();
        assert!(matches!(repo.get(job_id).await, Err(RepositoryError::Corrupt(_))));
    }
}
