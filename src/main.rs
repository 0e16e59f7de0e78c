// Command-line front end for the manga page translator

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use manga_translator::{
    build_extractor, build_translator, languages, Config, CosmicTextBackend, FileJobRepository, JobId,
    JobPipeline, JobSnapshot, JobStatus, JobWorker, LocalStorage, Metrics, PipelineParts,
};

#[derive(Parser, Debug)]
#[command(name = "manga-translator")]
#[command(about = "Detect, translate and re-typeset the text of manga pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate one page or CBZ archive end to end
    Translate {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// Print metrics in Prometheus text format when done
        #[arg(long)]
        metrics: bool,
    },

    /// Translate several inputs concurrently into a directory
    Batch {
        inputs: Vec<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },

    /// Create a job without running it
    Submit {
        input: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },

    /// Run the next stage of a job
    Advance { job: JobId },

    /// Show a job's status
    Status { job: JobId },

    /// List supported languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_translator={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Languages => {
            for lang in languages() {
                println!("{:<12} {:<4} {}", lang.name(), lang.iso_code(), lang.tesseract_code());
            }
            Ok(())
        }
        Commands::Translate {
            input,
            output,
            source,
            target,
            metrics,
        } => {
            let pipeline = build_pipeline(&config).await?;
            let (source, target) = language_args(&config, source, target);

            let job = submit_file(&pipeline, &input, &source, &target).await?;
            let snapshot = pipeline.run_to_completion(job).await?;
            print_snapshot(&snapshot)?;
            write_result(&pipeline, &snapshot, &output).await?;

            if metrics {
                print!("{}", pipeline.metrics().to_prometheus());
            }
            Ok(())
        }
        Commands::Batch {
            inputs,
            out_dir,
            source,
            target,
        } => {
            let pipeline = Arc::new(build_pipeline(&config).await?);
            let (source, target) = language_args(&config, source, target);
            tokio::fs::create_dir_all(&out_dir)
                .await
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;

            let mut jobs = Vec::with_capacity(inputs.len());
            for input in &inputs {
                jobs.push((submit_file(&pipeline, input, &source, &target).await?, input));
            }

            let worker = JobWorker::spawn(Arc::clone(&pipeline), config.pipeline.max_concurrent_jobs);
            for (job, _) in &jobs {
                if !worker.enqueue(*job).await {
                    bail!("Job worker stopped before all jobs were queued");
                }
            }
            worker.shutdown().await;

            for (job, input) in jobs {
                let snapshot = pipeline.status(job).await?;
                print_snapshot(&snapshot)?;
                if snapshot.status == JobStatus::Completed {
                    let name = input.file_stem().map(|s| s.to_string_lossy().to_string());
                    let ext = snapshot
                        .result_ref
                        .as_ref()
                        .and_then(|r| r.as_str().rsplit_once('.').map(|(_, e)| e.to_string()))
                        .unwrap_or_else(|| "png".to_string());
                    let output = out_dir.join(format!("{}.{}", name.unwrap_or_else(|| job.to_string()), ext));
                    write_result(&pipeline, &snapshot, &output).await?;
                }
            }

            let summary = pipeline.metrics().snapshot();
            info!(
                "Batch done: {} completed, {} failed, {} regions rendered",
                summary.jobs_completed, summary.jobs_failed, summary.regions_rendered
            );
            Ok(())
        }
        Commands::Submit { input, source, target } => {
            let pipeline = build_pipeline(&config).await?;
            let (source, target) = language_args(&config, source, target);
            let job = submit_file(&pipeline, &input, &source, &target).await?;
            print_snapshot(&pipeline.status(job).await?)
        }
        Commands::Advance { job } => {
            let pipeline = build_pipeline(&config).await?;
            print_snapshot(&pipeline.advance(job).await?)
        }
        Commands::Status { job } => {
            let pipeline = build_pipeline(&config).await?;
            let snapshot = pipeline.status(job).await?;
            print_snapshot(&snapshot)?;
            if let Some(reference) = &snapshot.result_ref {
                println!("download: {}", pipeline.download_ref(reference));
            }
            Ok(())
        }
    }
}

async fn build_pipeline(config: &Config) -> Result<JobPipeline> {
    let metrics = Metrics::new();

    let repository = FileJobRepository::new(&config.pipeline.jobs_dir)
        .await
        .context("Failed to open job repository")?;
    let storage = LocalStorage::new(&config.storage.root)
        .await
        .context("Failed to open storage")?;
    let extractor = build_extractor(&config.extraction);
    let translator = build_translator(&config.translation, Some(metrics.clone())).await?;
    let text_backend = CosmicTextBackend::new(&config.rendering.fonts_dir, config.rendering.load_system_fonts);

    Ok(JobPipeline::new(
        config,
        PipelineParts {
            repository: Arc::new(repository),
            storage: Arc::new(storage),
            extractor,
            translator,
            text_backend: Arc::new(text_backend),
            metrics,
        },
    ))
}

fn language_args(config: &Config, source: Option<String>, target: Option<String>) -> (String, String) {
    (
        source.unwrap_or_else(|| config.languages.default_source.name().to_string()),
        target.unwrap_or_else(|| config.languages.default_target.name().to_string()),
    )
}

async fn submit_file(pipeline: &JobPipeline, input: &Path, source: &str, target: &str) -> Result<JobId> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    let job = pipeline.submit(bytes, &filename, source, target).await?;
    Ok(job.id())
}

async fn write_result(pipeline: &JobPipeline, snapshot: &JobSnapshot, output: &Path) -> Result<()> {
    if snapshot.status != JobStatus::Completed {
        bail!(
            "Job {} {}: {}",
            snapshot.job_id,
            snapshot.status.as_str(),
            snapshot.error_message.as_deref().unwrap_or("no result")
        );
    }
    let bytes = pipeline
        .load_result(snapshot.job_id)
        .await?
        .context("Completed job has no result")?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

fn print_snapshot(snapshot: &JobSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}
