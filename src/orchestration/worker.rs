// Queue consumer running jobs to completion with bounded concurrency

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::core::types::JobId;
use crate::orchestration::pipeline::JobPipeline;

const QUEUE_CAPACITY: usize = 1024;

/// Runs queued jobs, at most `max_concurrent` at a time.
///
/// Jobs share nothing but the pipeline; each job's stages still run in order.
pub struct JobWorker {
    sender: mpsc::Sender<JobId>,
    handle: JoinHandle<()>,
}

impl JobWorker {
    pub fn spawn(pipeline: Arc<JobPipeline>, max_concurrent: usize) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        info!("Job worker started ({} concurrent jobs)", max_concurrent.max(1));

        let handle = tokio::spawn(Self::run(pipeline, semaphore, receiver));
        Self { sender, handle }
    }

    async fn run(pipeline: Arc<JobPipeline>, semaphore: Arc<Semaphore>, mut receiver: mpsc::Receiver<JobId>) {
        let mut tasks = JoinSet::new();

        while let Some(job_id) = receiver.recv().await {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = Arc::clone(&pipeline);

            tasks.spawn(async move {
                let _permit = permit;
                match pipeline.run_to_completion(job_id).await {
                    Ok(snapshot) => info!("Job {} finished: {}", job_id, snapshot.status.as_str()),
                    Err(e) => error!("Job {} could not be advanced: {}", job_id, e),
                }
            });

            // Reap finished tasks so the set does not grow with the queue
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    warn!("Job task panicked: {}", e);
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Job task panicked: {}", e);
            }
        }
    }

    /// Queue a submitted job. Returns false once the worker has stopped.
    pub async fn enqueue(&self, job_id: JobId) -> bool {
        self.sender.send(job_id).await.is_ok()
    }

    /// Stop accepting jobs and wait for queued and in-flight ones
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            warn!("Job worker stopped abnormally: {}", e);
        }
    }
}
