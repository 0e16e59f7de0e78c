use crate::core::errors::ConfigError;
use crate::core::language::Language;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Region detection tuning
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Gray values at or below this become foreground
    pub binary_threshold: u8,
    /// Side of the square structuring element
    pub kernel_size: u32,
    pub dilate_iterations: u32,
    pub erode_iterations: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Boxes wider/taller than this fraction of the page are background
    pub max_fraction: f32,
    pub padding: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 180,
            kernel_size: 5,
            dilate_iterations: 4,
            erode_iterations: 2,
            min_width: 20,
            min_height: 20,
            max_fraction: 0.9,
            padding: 5,
        }
    }
}

/// Which TextExtractor implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionBackend {
    /// Designated fallback: recognizes nothing
    None,
    Tesseract,
}

impl FromStr for ExtractionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "tesseract" => Ok(Self::Tesseract),
            other => Err(ConfigError::UnknownBackend {
                setting: "EXTRACTION_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// What to do with a region the extractor could not read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadablePolicy {
    DropRegion,
    Fail,
}

impl FromStr for UnreadablePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" | "drop-region" => Ok(Self::DropRegion),
            "fail" => Ok(Self::Fail),
            other => Err(ConfigError::UnknownBackend {
                setting: "ON_REGION_UNREADABLE",
                value: other.to_string(),
            }),
        }
    }
}

/// Text extraction configuration
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub backend: ExtractionBackend,
    pub tesseract_path: String,
    /// Regions scoring below this are dropped, in [0, 100]
    pub min_confidence: f32,
    pub on_unreadable: UnreadablePolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend: ExtractionBackend::None,
            tesseract_path: "tesseract".to_string(),
            min_confidence: 40.0,
            on_unreadable: UnreadablePolicy::DropRegion,
        }
    }
}

/// Which Translator implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationBackend {
    /// Designated fallback: returns the source text
    Identity,
    Http,
}

impl FromStr for TranslationBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "identity" | "" => Ok(Self::Identity),
            "http" | "libretranslate" => Ok(Self::Http),
            other => Err(ConfigError::UnknownBackend {
                setting: "TRANSLATION_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// What to do when the provider rejects a text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedPolicy {
    KeepSource,
    Fail,
}

impl FromStr for RejectedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep-source" | "keep" => Ok(Self::KeepSource),
            "fail" => Ok(Self::Fail),
            other => Err(ConfigError::UnknownBackend {
                setting: "ON_TRANSLATION_REJECTED",
                value: other.to_string(),
            }),
        }
    }
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub backend: TranslationBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub cache_capacity: usize,
    pub cache_dir: Option<PathBuf>,
    pub on_rejected: RejectedPolicy,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::Identity,
            endpoint: None,
            api_key: None,
            timeout_secs: 30,
            cache_capacity: 10_000,
            cache_dir: None,
            on_rejected: RejectedPolicy::KeepSource,
        }
    }
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    /// Font size as a fraction of box height
    pub font_scale: f32,
    pub min_font_size: f32,
    pub max_font_size: f32,
    /// Text length at which length-based shrinking starts
    pub length_reference: usize,
    /// Line height multiple used only when no font metrics are available
    pub line_height_ratio: f32,
    /// Regions narrower or shorter than this are left untouched
    pub min_render_size: u32,
    pub fill_color: [u8; 3],
    pub text_color: [u8; 3],
    pub text_color_from_region: bool,
    pub fonts_dir: PathBuf,
    pub load_system_fonts: bool,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            font_scale: 0.7,
            min_font_size: 10.0,
            max_font_size: 36.0,
            length_reference: 20,
            line_height_ratio: 1.35,
            min_render_size: 16,
            fill_color: [255, 255, 255],
            text_color: [0, 0, 0],
            text_color_from_region: false,
            fonts_dir: PathBuf::from("fonts"),
            load_system_fonts: true,
        }
    }
}

/// Language defaults
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub default_source: Language,
    pub default_target: Language,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default_source: Language::Japanese,
            default_target: Language::English,
        }
    }
}

/// Job execution configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-job scratch directories live under here
    pub work_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    /// Where the file-backed job repository keeps records
    pub jobs_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp"),
            // max(half the cores, 2)
            max_concurrent_jobs: std::cmp::max(num_cpus::get() / 2, 2),
            jobs_dir: PathBuf::from("jobs"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub detection: DetectionConfig,
    pub extraction: ExtractionConfig,
    pub translation: TranslationConfig,
    pub rendering: RenderingConfig,
    pub languages: LanguageConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            detection: DetectionConfig::default(),
            extraction: ExtractionConfig::default(),
            translation: TranslationConfig::default(),
            rendering: RenderingConfig::default(),
            languages: LanguageConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Parse an env var, keeping `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(defaults.log_level);

        let d = defaults.detection;
        let detection = DetectionConfig {
            binary_threshold: env_or("DETECT_BINARY_THRESHOLD", d.binary_threshold),
            kernel_size: env_or("DETECT_KERNEL_SIZE", d.kernel_size),
            dilate_iterations: env_or("DETECT_DILATE_ITERATIONS", d.dilate_iterations),
            erode_iterations: env_or("DETECT_ERODE_ITERATIONS", d.erode_iterations),
            min_width: env_or("DETECT_MIN_WIDTH", d.min_width),
            min_height: env_or("DETECT_MIN_HEIGHT", d.min_height),
            max_fraction: env_or("DETECT_MAX_FRACTION", d.max_fraction),
            padding: env_or("DETECT_PADDING", d.padding),
        };

        let e = defaults.extraction;
        let extraction = ExtractionConfig {
            backend: match env::var("EXTRACTION_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => e.backend,
            },
            tesseract_path: env::var("TESSERACT_PATH").unwrap_or(e.tesseract_path),
            min_confidence: env_or("MIN_CONFIDENCE", e.min_confidence),
            on_unreadable: match env::var("ON_REGION_UNREADABLE") {
                Ok(value) => value.parse()?,
                Err(_) => e.on_unreadable,
            },
        };

        let t = defaults.translation;
        let translation = TranslationConfig {
            backend: match env::var("TRANSLATION_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => t.backend,
            },
            endpoint: env_nonempty("TRANSLATION_ENDPOINT"),
            api_key: env_nonempty("TRANSLATION_API_KEY"),
            timeout_secs: env_or("TRANSLATION_TIMEOUT_SECS", t.timeout_secs),
            cache_capacity: env_or("TRANSLATION_CACHE_CAPACITY", t.cache_capacity),
            cache_dir: env_nonempty("CACHE_DIR").map(PathBuf::from),
            on_rejected: match env::var("ON_TRANSLATION_REJECTED") {
                Ok(value) => value.parse()?,
                Err(_) => t.on_rejected,
            },
        };

        let r = defaults.rendering;
        let rendering = RenderingConfig {
            font_scale: env_or("FONT_SCALE", r.font_scale),
            min_font_size: env_or("MIN_FONT_SIZE", r.min_font_size),
            max_font_size: env_or("MAX_FONT_SIZE", r.max_font_size),
            length_reference: env_or("FONT_LENGTH_REFERENCE", r.length_reference),
            line_height_ratio: env_or("LINE_HEIGHT_RATIO", r.line_height_ratio),
            min_render_size: env_or("MIN_RENDER_SIZE", r.min_render_size),
            fill_color: r.fill_color,
            text_color: r.text_color,
            text_color_from_region: env_or("TEXT_COLOR_FROM_REGION", r.text_color_from_region),
            fonts_dir: env_path("FONTS_DIR", r.fonts_dir),
            load_system_fonts: env_or("LOAD_SYSTEM_FONTS", r.load_system_fonts),
        };

        let l = defaults.languages;
        let languages = LanguageConfig {
            default_source: env::var("DEFAULT_SOURCE_LANGUAGE")
                .ok()
                .and_then(|s| Language::parse(&s))
                .unwrap_or(l.default_source),
            default_target: env::var("DEFAULT_TARGET_LANGUAGE")
                .ok()
                .and_then(|s| Language::parse(&s))
                .unwrap_or(l.default_target),
        };

        let p = defaults.pipeline;
        let pipeline = PipelineConfig {
            work_dir: env_path("WORK_DIR", p.work_dir),
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", p.max_concurrent_jobs),
            jobs_dir: env_path("JOBS_DIR", p.jobs_dir),
        };

        let storage = StorageConfig {
            root: env_path("STORAGE_ROOT", defaults.storage.root),
        };

        Ok(Self {
            log_level,
            detection,
            extraction,
            translation,
            rendering,
            languages,
            pipeline,
            storage,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.kernel_size == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "kernel_size must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&d.max_fraction) || d.max_fraction == 0.0 {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "max_fraction must be in (0.0, 1.0], got {}",
                d.max_fraction
            )));
        }

        if !(0.0..=100.0).contains(&self.extraction.min_confidence) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.extraction.min_confidence,
            ));
        }
        if self.extraction.backend == ExtractionBackend::Tesseract
            && self.extraction.tesseract_path.trim().is_empty()
        {
            return Err(ConfigError::InvalidExtractionConfig(
                "TESSERACT_PATH must not be empty".to_string(),
            ));
        }

        if self.translation.backend == TranslationBackend::Http && self.translation.endpoint.is_none() {
            return Err(ConfigError::InvalidTranslationConfig(
                "TRANSLATION_ENDPOINT is required for the http backend".to_string(),
            ));
        }
        if self.translation.cache_capacity == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "cache_capacity must be > 0".to_string(),
            ));
        }

        let r = &self.rendering;
        if !(r.font_scale > 0.0 && r.font_scale <= 1.0) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font_scale must be in (0.0, 1.0], got {}",
                r.font_scale
            )));
        }
        if r.min_font_size <= 0.0 || r.max_font_size < r.min_font_size {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font size range [{}, {}] is invalid",
                r.min_font_size, r.max_font_size
            )));
        }
        if r.line_height_ratio < 1.0 {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "line_height_ratio must be >= 1.0, got {}",
                r.line_height_ratio
            )));
        }
        if r.length_reference == 0 {
            return Err(ConfigError::InvalidRenderingConfig(
                "length_reference must be > 0".to_string(),
            ));
        }

        if self.pipeline.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidConcurrency(self.pipeline.max_concurrent_jobs));
        }

        Ok(())
    }

    /// Defaults with every directory rooted at `root`
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut config = Config::default();
        config.pipeline.work_dir = root.join("temp");
        config.pipeline.jobs_dir = root.join("jobs");
        config.storage.root = root.join("storage");
        config
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }
}
