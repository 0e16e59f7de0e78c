use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::core::errors::{StorageError, StorageResult};
use crate::core::types::{FileRef, JobId};

const UPLOADS_DIR: &str = "uploads";
const RESULTS_DIR: &str = "results";

/// Persists uploaded and produced files behind opaque references
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save_upload(&self, job_id: JobId, extension: &str, bytes: &[u8]) -> StorageResult<FileRef>;

    async fn save_result(&self, job_id: JobId, extension: &str, bytes: &[u8]) -> StorageResult<FileRef>;

    async fn load(&self, reference: &FileRef) -> StorageResult<Vec<u8>>;

    async fn delete(&self, reference: &FileRef) -> StorageResult<()>;

    /// Location a client can fetch the file from
    fn download_ref(&self, reference: &FileRef) -> String;
}

/// Filesystem storage rooted at one directory.
///
/// References are root-relative keys such as `uploads/<job>.png`.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        for dir in [UPLOADS_DIR, RESULTS_DIR] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|source| io_error(&path, source))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference, refusing anything that escapes the root
    fn resolve(&self, reference: &FileRef) -> StorageResult<PathBuf> {
        let relative = Path::new(reference.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || reference.as_str().is_empty() {
            return Err(StorageError::NotFound(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn write(&self, dir: &str, job_id: JobId, extension: &str, bytes: &[u8]) -> StorageResult<FileRef> {
        let key = format!("{}/{}.{}", dir, job_id, extension.trim_start_matches('.'));
        let path = self.root.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| io_error(&path, source))?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(FileRef::new(key))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    async fn save_upload(&self, job_id: JobId, extension: &str, bytes: &[u8]) -> StorageResult<FileRef> {
        self.write(UPLOADS_DIR, job_id, extension, bytes).await
    }

    async fn save_result(&self, job_id: JobId, extension: &str, bytes: &[u8]) -> StorageResult<FileRef> {
        self.write(RESULTS_DIR, job_id, extension, bytes).await
    }

    async fn load(&self, reference: &FileRef) -> StorageResult<Vec<u8>> {
        let path = self.resolve(reference)?;
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(reference.to_string())
            } else {
                io_error(&path, source)
            }
        })
    }

    async fn delete(&self, reference: &FileRef) -> StorageResult<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn download_ref(&self, reference: &FileRef) -> String {
        self.root.join(reference.as_str()).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_result_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let job_id = JobId::new();

        let upload = storage.save_upload(job_id, "png", b"page").await.unwrap();
        assert_eq!(upload.as_str(), format!("uploads/{}.png", job_id));
        assert_eq!(storage.load(&upload).await.unwrap(), b"page");

        let result = storage.save_result(job_id, ".cbz", b"zip").await.unwrap();
        assert!(result.as_str().starts_with("results/"));
        assert!(result.as_str().ends_with(".cbz"));
        assert!(storage.download_ref(&result).ends_with(".cbz"));
    }

    #[tokio::test]
    async fn test_missing_and_escaping_refs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let missing = storage.load(&FileRef::new("uploads/none.png")).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));

        let escaping = storage.load(&FileRef::new("../etc/passwd")).await;
        assert!(matches!(escaping, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let reference = storage.save_upload(JobId::new(), "png", b"x").await.unwrap();

        storage.delete(&reference).await.unwrap();
        storage.delete(&reference).await.unwrap();
        assert!(storage.load(&reference).await.is_err());
    }
}
