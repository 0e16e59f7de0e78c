// Job pipeline: submit / advance / status
//
// Each call to `advance` runs exactly one stage. A stage writes its output
// to the job's work dir before the job record moves past it, so a crashed
// job resumes from the last committed stage.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::{Config, LanguageConfig};
use crate::core::errors::{
    ErrorContext, PipelineError, PipelineResult, RenderingError, RepositoryError, ServiceError,
    ServiceResult,
};
use crate::core::job::{Job, JobSnapshot, Stage};
use crate::core::language::Language;
use crate::core::types::{DocumentKind, FileRef, JobId, PageRegions};
use crate::orchestration::checkpoint::WorkDirs;
use crate::orchestration::fallback::FallbackPolicy;
use crate::orchestration::repository::JobRepository;
use crate::phases::{Phase1Pipeline, Phase2Pipeline, Phase3Pipeline};
use crate::services::detection::RegionDetector;
use crate::services::document::{decode_document, Document};
use crate::services::extraction::TextExtractor;
use crate::services::rendering::{LayoutRenderer, TextBackend};
use crate::services::storage::StorageAdapter;
use crate::services::translation::Translator;
use crate::utils::image_ops::spawn_image_task;
use crate::utils::metrics::Metrics;

/// Collaborators a pipeline is assembled from
pub struct PipelineParts {
    pub repository: Arc<dyn JobRepository>,
    pub storage: Arc<dyn StorageAdapter>,
    pub extractor: Arc<dyn TextExtractor>,
    pub translator: Arc<dyn Translator>,
    pub text_backend: Arc<dyn TextBackend>,
    pub metrics: Metrics,
}

/// What a successful stage produced
enum StageOutcome {
    /// Output checkpointed, more stages follow
    Committed,
    /// Final artifact stored
    Finished(FileRef),
}

pub struct JobPipeline {
    repository: Arc<dyn JobRepository>,
    storage: Arc<dyn StorageAdapter>,
    phase1: Phase1Pipeline,
    phase2: Phase2Pipeline,
    phase3: Phase3Pipeline,
    work_dirs: WorkDirs,
    languages: LanguageConfig,
    metrics: Metrics,
}

impl JobPipeline {
    pub fn new(config: &Config, parts: PipelineParts) -> Self {
        let policy = FallbackPolicy::from_config(&config.extraction, &config.translation);
        let detector = Arc::new(RegionDetector::new(config.detection.clone()));
        let renderer = Arc::new(LayoutRenderer::new(&config.rendering, parts.text_backend));

        Self {
            phase1: Phase1Pipeline::new(
                detector,
                parts.extractor,
                policy,
                config.extraction.min_confidence,
                parts.metrics.clone(),
            ),
            phase2: Phase2Pipeline::new(parts.translator, policy, parts.metrics.clone()),
            phase3: Phase3Pipeline::new(renderer, parts.metrics.clone()),
            repository: parts.repository,
            storage: parts.storage,
            work_dirs: WorkDirs::new(&config.pipeline.work_dir),
            languages: config.languages.clone(),
            metrics: parts.metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validate and store an upload, and create a Pending job for it.
    ///
    /// Undecodable input is rejected before anything is stored. Unknown
    /// language names resolve to the configured defaults.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn submit(&self, bytes: Vec<u8>, filename: &str, source: &str, target: &str) -> ServiceResult<Job> {
        let name = filename.to_string();
        let (bytes, probe) = tokio::task::spawn_blocking(move || {
            let probe = decode_document(&name, &bytes).map(|doc| (doc.kind, doc.page_count()));
            (bytes, probe)
        })
        .await
        .map_err(|e| ServiceError::TaskJoinFailed(e.to_string()))?;
        let (kind, page_count) = probe?;

        let source_language = Language::resolve(source, self.languages.default_source);
        let target_language = Language::resolve(target, self.languages.default_target);

        let job_id = JobId::new();
        let original = self
            .storage
            .save_upload(job_id, &upload_extension(filename, kind), &bytes)
            .await?;

        let job = Job::new(
            job_id,
            source_language,
            target_language,
            filename,
            kind,
            page_count,
            original.clone(),
        );
        if let Err(e) = self.repository.create(&job).await {
            if let Err(cleanup) = self.storage.delete(&original).await {
                warn!("Failed to remove upload {}: {}", original, cleanup);
            }
            return Err(e.into());
        }

        self.metrics.record_job_submitted();
        info!(
            "Job {} submitted: {} ({} page(s), {} -> {})",
            job_id,
            filename,
            page_count,
            source_language,
            target_language
        );
        Ok(job)
    }

    /// Run the next pending stage of a job.
    ///
    /// Terminal jobs are returned unchanged. Stage failures mark the job
    /// Failed and are reported through the snapshot; only repository errors
    /// are returned as `Err`.
    #[instrument(skip(self))]
    pub async fn advance(&self, job_id: JobId) -> ServiceResult<JobSnapshot> {
        let mut job = self.repository.get(job_id).await?;
        let Some(stage) = job.next_stage() else {
            debug!("Job {} is already {}", job_id, job.status().as_str());
            return Ok(job.snapshot());
        };

        job.start()?;
        job.raise_progress(stage.entry_progress())?;
        if let Err(e) = self.repository.update(&mut job).await {
            return self.yield_to_newer(job_id, stage, e).await;
        }
        info!("Job {}: {} started", job_id, stage.as_str());

        let started = Instant::now();
        let outcome = match stage {
            Stage::Extraction => self.run_extraction(&mut job).await,
            Stage::Translation => self.run_translation(&mut job).await,
            Stage::Rendering => self.run_rendering(&mut job).await,
        };
        self.metrics.record_stage_duration(stage, started.elapsed());

        match outcome {
            Ok(StageOutcome::Committed) => {
                job.complete_stage(stage)?;
                info!(
                    "Job {}: {} done in {:.2}ms",
                    job_id,
                    stage.as_str(),
                    started.elapsed().as_secs_f64() * 1000.0
                );
            }
            Ok(StageOutcome::Finished(result)) => {
                job.complete_stage(stage)?;
                job.complete(result)?;
                info!("Job {} completed", job_id);
            }
            Err(e) => {
                error!("Job {} failed during {}: {}", job_id, stage.as_str(), e);
                job.fail(e.to_string())?;
            }
        }
        if let Err(e) = self.repository.update(&mut job).await {
            return self.yield_to_newer(job_id, stage, e).await;
        }

        if job.status().is_terminal() {
            self.work_dirs.cleanup(job_id).await;
            self.metrics
                .record_job_finished(job.result_file_ref().is_some(), job.page_count());
        }
        Ok(job.snapshot())
    }

    /// Another `advance` wrote the record first: drop this run's outcome and
    /// report what is stored. Any other repository error is returned.
    async fn yield_to_newer(
        &self,
        job_id: JobId,
        stage: Stage,
        err: RepositoryError,
    ) -> ServiceResult<JobSnapshot> {
        if !matches!(err, RepositoryError::Conflict { .. }) {
            return Err(err.into());
        }
        warn!("Job {}: {} outcome dropped: {}", job_id, stage.as_str(), err);

        let stored = self.repository.get(job_id).await?;
        if stored.status().is_terminal() {
            // A late checkpoint write may have recreated the work dir
            self.work_dirs.cleanup(job_id).await;
        }
        Ok(stored.snapshot())
    }

    pub async fn status(&self, job_id: JobId) -> ServiceResult<JobSnapshot> {
        Ok(self.repository.get(job_id).await?.snapshot())
    }

    /// Advance until the job is terminal
    pub async fn run_to_completion(&self, job_id: JobId) -> ServiceResult<JobSnapshot> {
        loop {
            let snapshot = self.advance(job_id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
        }
    }

    /// Bytes of a completed job's artifact
    pub async fn load_result(&self, job_id: JobId) -> ServiceResult<Option<Vec<u8>>> {
        let job = self.repository.get(job_id).await?;
        match job.result_file_ref() {
            Some(reference) => Ok(Some(self.storage.load(reference).await?)),
            None => Ok(None),
        }
    }

    pub fn download_ref(&self, reference: &FileRef) -> String {
        self.storage.download_ref(reference)
    }

    async fn run_extraction(&self, job: &mut Job) -> PipelineResult<StageOutcome> {
        let document = self.load_document(job).await?;
        let total = document.page_count();

        let mut pages = Vec::with_capacity(total);
        for (page_index, page) in document.pages.iter().enumerate() {
            let regions = self
                .phase1
                .execute(page_index, &page.image, job.source_language())
                .await?;
            pages.push(regions);
            self.report_progress(job, Stage::Extraction, page_index + 1, total).await;
        }

        self.work_dirs.save(job.id(), Stage::Extraction, &pages).await?;
        Ok(StageOutcome::Committed)
    }

    async fn run_translation(&self, job: &mut Job) -> PipelineResult<StageOutcome> {
        let mut pages = self.load_pages(job, Stage::Extraction).await?;
        let total = pages.len();

        for (done, page) in pages.iter_mut().enumerate() {
            self.phase2
                .execute(page, job.source_language(), job.target_language())
                .await?;
            self.report_progress(job, Stage::Translation, done + 1, total).await;
        }
        self.phase2.finish().await;

        self.work_dirs.save(job.id(), Stage::Translation, &pages).await?;
        Ok(StageOutcome::Committed)
    }

    async fn run_rendering(&self, job: &mut Job) -> PipelineResult<StageOutcome> {
        let pages = self.load_pages(job, Stage::Translation).await?;
        let document = self.load_document(job).await?;
        let total = pages.len();

        let mut images = document.pages.into_iter().map(|page| page.image);
        let mut rendered = Vec::with_capacity(total);
        for (done, regions) in pages.into_iter().enumerate() {
            let page_index = regions.page_index;
            let image = images
                .next()
                .ok_or(RenderingError::MissingPage { page_index })
                .with_page_context(page_index)?;
            rendered.push(self.phase3.execute(image, regions).await?);
            self.report_progress(job, Stage::Rendering, done + 1, total).await;
        }

        let bytes = self.phase3.assemble(job.document_kind(), rendered).await?;
        let result = self
            .storage
            .save_result(job.id(), job.document_kind().extension(), &bytes)
            .await?;
        Ok(StageOutcome::Finished(result))
    }

    /// Read a stage checkpoint and check it still describes this job's pages
    async fn load_pages(&self, job: &Job, stage: Stage) -> PipelineResult<Vec<PageRegions>> {
        let pages: Vec<PageRegions> = self.work_dirs.load(job.id(), stage).await?;
        let invalid = |reason: String| PipelineError::Checkpoint { stage, reason };

        if pages.len() != job.page_count() {
            return Err(invalid(format!(
                "{} page(s) recorded, document has {}",
                pages.len(),
                job.page_count()
            )));
        }
        for (index, page) in pages.iter().enumerate() {
            if page.page_index != index {
                return Err(invalid(format!("page {} recorded at position {}", page.page_index, index)));
            }
            if let Some(region_index) = page.first_out_of_bounds() {
                return Err(invalid(format!(
                    "region {} on page {} lies outside the {}x{} page",
                    region_index, index, page.width, page.height
                )));
            }
        }
        Ok(pages)
    }

    async fn load_document(&self, job: &Job) -> PipelineResult<Document> {
        let reference = job.original_file_ref().ok_or(PipelineError::MissingOriginal)?;
        let bytes = self.storage.load(reference).await?;
        let name = job.original_filename().to_string();
        spawn_image_task(move || Ok(decode_document(&name, &bytes)?)).await
    }

    /// Persist intra-stage progress. Failures only warn; the stage result
    /// is what must be durable.
    async fn report_progress(&self, job: &mut Job, stage: Stage, done: usize, total: usize) {
        if let Err(e) = job.raise_progress(page_progress(stage, done, total)) {
            warn!("Job {}: progress not recorded: {}", job.id(), e);
            return;
        }
        if let Err(e) = self.repository.update(job).await {
            warn!("Job {}: progress not persisted: {}", job.id(), e);
        }
    }
}

/// Progress after `done` of `total` pages, kept below the stage exit mark
fn page_progress(stage: Stage, done: usize, total: usize) -> u8 {
    let entry = stage.entry_progress() as usize;
    let span = (stage.exit_progress() - stage.entry_progress()) as usize - 1;
    (entry + span * done.min(total) / total.max(1)) as u8
}

/// Stored upload extension: the filename's for images, the kind's otherwise
fn upload_extension(filename: &str, kind: DocumentKind) -> String {
    match kind {
        DocumentKind::Archive | DocumentKind::Pdf => kind.extension().to_string(),
        DocumentKind::Image => filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| kind.extension().to_string()),
    }
}
