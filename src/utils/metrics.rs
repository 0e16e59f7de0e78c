use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::job::Stage;

/// Process-wide counters for jobs, stages and collaborator calls.
///
/// Cheap to clone; every clone shares the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Job Metrics
    jobs_submitted: AtomicUsize,
    jobs_completed: AtomicUsize,
    jobs_failed: AtomicUsize,
    pages_processed: AtomicUsize,

    // Region Metrics
    regions_detected: AtomicUsize,
    regions_dropped: AtomicUsize,
    regions_rendered: AtomicUsize,

    // Translation Metrics
    translation_calls_total: AtomicUsize,
    translation_calls_failed: AtomicUsize,
    translation_fallbacks: AtomicUsize,
    translation_latency_ms: RwLock<Vec<u64>>,

    // Cache Metrics
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,

    // Stage durations
    stage_duration_ms: DashMap<Stage, Vec<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                jobs_submitted: AtomicUsize::new(0),
                jobs_completed: AtomicUsize::new(0),
                jobs_failed: AtomicUsize::new(0),
                pages_processed: AtomicUsize::new(0),
                regions_detected: AtomicUsize::new(0),
                regions_dropped: AtomicUsize::new(0),
                regions_rendered: AtomicUsize::new(0),
                translation_calls_total: AtomicUsize::new(0),
                translation_calls_failed: AtomicUsize::new(0),
                translation_fallbacks: AtomicUsize::new(0),
                translation_latency_ms: RwLock::new(Vec::new()),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                stage_duration_ms: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Job Metrics
    pub fn record_job_submitted(&self) {
        self.inner.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_finished(&self, success: bool, pages: usize) {
        if success {
            self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);
            self.inner.pages_processed.fetch_add(pages, Ordering::Relaxed);
        } else {
            self.inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Region Metrics
    pub fn record_regions_detected(&self, count: usize) {
        self.inner.regions_detected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_regions_dropped(&self, count: usize) {
        self.inner.regions_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_regions_rendered(&self, count: usize) {
        self.inner.regions_rendered.fetch_add(count, Ordering::Relaxed);
    }

    // Translation Metrics
    pub fn record_translation_call(&self, success: bool, duration: Duration) {
        self.inner.translation_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.translation_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.translation_latency_ms.write().push(duration.as_millis() as u64);
    }

    /// A rejected translation was replaced with the source text
    pub fn record_translation_fallback(&self) {
        self.inner.translation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Cache Metrics
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    // Stage Metrics
    pub fn record_stage_duration(&self, stage: Stage, duration: Duration) {
        self.inner
            .stage_duration_ms
            .entry(stage)
            .or_default()
            .push(duration.as_millis() as u64);
    }

    fn stage_avg(&self, stage: Stage) -> u64 {
        self.inner
            .stage_duration_ms
            .get(&stage)
            .map(|durations| avg(&durations))
            .unwrap_or(0)
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.translation_latency_ms.read();
        let translation_latency_avg_ms = avg(&latency);
        let translation_latency_p95_ms = percentile(&latency, 0.95);
        drop(latency);

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            jobs_submitted: self.inner.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            pages_processed: self.inner.pages_processed.load(Ordering::Relaxed),
            regions_detected: self.inner.regions_detected.load(Ordering::Relaxed),
            regions_dropped: self.inner.regions_dropped.load(Ordering::Relaxed),
            regions_rendered: self.inner.regions_rendered.load(Ordering::Relaxed),
            translation_calls_total: self.inner.translation_calls_total.load(Ordering::Relaxed),
            translation_calls_failed: self.inner.translation_calls_failed.load(Ordering::Relaxed),
            translation_fallbacks: self.inner.translation_fallbacks.load(Ordering::Relaxed),
            translation_latency_avg_ms,
            translation_latency_p95_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            extraction_avg_ms: self.stage_avg(Stage::Extraction),
            translation_avg_ms: self.stage_avg(Stage::Translation),
            rendering_avg_ms: self.stage_avg(Stage::Rendering),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP jobs_submitted_total Jobs accepted by submit
# TYPE jobs_submitted_total counter
jobs_submitted_total {{}} {}

# HELP jobs_finished_total Jobs that reached a terminal state
# TYPE jobs_finished_total counter
jobs_finished_total {{status="completed"}} {}
jobs_finished_total {{status="failed"}} {}

# HELP pages_processed_total Pages in completed jobs
# TYPE pages_processed_total counter
pages_processed_total {{}} {}

# HELP regions_total Regions by outcome
# TYPE regions_total counter
regions_total {{outcome="detected"}} {}
regions_total {{outcome="dropped"}} {}
regions_total {{outcome="rendered"}} {}

# HELP translation_calls_total Calls made to the translation backend
# TYPE translation_calls_total counter
translation_calls_total {{}} {}
translation_calls_failed_total {{}} {}
translation_fallbacks_total {{}} {}

# HELP translation_latency_avg_ms Average translation latency in milliseconds
# TYPE translation_latency_avg_ms gauge
translation_latency_avg_ms {{}} {}

# HELP cache_hit_rate Cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP cache_size Current cache size
# TYPE cache_size gauge
cache_size {{}} {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms {{stage="extraction"}} {}
stage_avg_duration_ms {{stage="translation"}} {}
stage_avg_duration_ms {{stage="rendering"}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.jobs_submitted,
            snapshot.jobs_completed,
            snapshot.jobs_failed,
            snapshot.pages_processed,
            snapshot.regions_detected,
            snapshot.regions_dropped,
            snapshot.regions_rendered,
            snapshot.translation_calls_total,
            snapshot.translation_calls_failed,
            snapshot.translation_fallbacks,
            snapshot.translation_latency_avg_ms,
            snapshot.cache_hit_rate,
            snapshot.cache_size,
            snapshot.extraction_avg_ms,
            snapshot.translation_avg_ms,
            snapshot.rendering_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub pages_processed: usize,
    pub regions_detected: usize,
    pub regions_dropped: usize,
    pub regions_rendered: usize,
    pub translation_calls_total: usize,
    pub translation_calls_failed: usize,
    pub translation_fallbacks: usize,
    pub translation_latency_avg_ms: u64,
    pub translation_latency_p95_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub extraction_avg_ms: u64,
    pub translation_avg_ms: u64,
    pub rendering_avg_ms: u64,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
