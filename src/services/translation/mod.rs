pub mod cache;
pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::core::config::{TranslationBackend, TranslationConfig};
use crate::core::errors::{ConfigError, TranslationResult};
use crate::core::language::Language;
use crate::utils::Metrics;

pub use cache::{CachedTranslator, TranslationCache};
pub use http::HttpTranslator;

/// Translation capability.
///
/// Implementations must be idempotent for identical input. A provider that
/// cannot serve a request at all returns `TranslationError::Unavailable`;
/// one that refuses a particular text returns `Rejected`. Deciding what to
/// do about either is left to the caller.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> TranslationResult<String>;

    /// Persist any buffered state
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Designated fallback: returns its input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    fn name(&self) -> &str {
        "identity"
    }

    async fn translate(
        &self,
        text: &str,
        _source: Language,
        _target: Language,
    ) -> TranslationResult<String> {
        Ok(text.to_string())
    }
}

/// Build the configured translator, wrapped in the persistent cache
pub async fn build_translator(
    config: &TranslationConfig,
    metrics: Option<Metrics>,
) -> Result<Arc<dyn Translator>, ConfigError> {
    let backend: Arc<dyn Translator> = match config.backend {
        TranslationBackend::Identity => return Ok(Arc::new(IdentityTranslator)),
        TranslationBackend::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                ConfigError::InvalidTranslationConfig("missing TRANSLATION_ENDPOINT".to_string())
            })?;
            Arc::new(
                HttpTranslator::new(
                    endpoint,
                    config.api_key.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
                .map_err(|e| ConfigError::InvalidTranslationConfig(e.to_string()))?,
            )
        }
    };

    let cache = TranslationCache::open(config.cache_dir.as_deref(), config.cache_capacity, metrics.clone())
        .await
        .map_err(|e| ConfigError::InvalidTranslationConfig(e.to_string()))?;
    info!("Translation backend: {} (cache capacity {})", backend.name(), config.cache_capacity);

    Ok(Arc::new(CachedTranslator::new(backend, cache, metrics)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_returns_input() {
        let translator = IdentityTranslator;
        let out = translator
            .translate("こんにちは", Language::Japanese, Language::English)
            .await
            .unwrap();
        assert_eq!(out, "こんにちは");
    }

    #[tokio::test]
    async fn test_build_identity_backend() {
        let translator = build_translator(&TranslationConfig::default(), None).await.unwrap();
        assert_eq!(translator.name(), "identity");
    }

    #[tokio::test]
    async fn test_http_backend_requires_endpoint() {
        let config = TranslationConfig {
            backend: TranslationBackend::Http,
            ..TranslationConfig::default()
        };
        assert!(build_translator(&config, None).await.is_err());
    }
}
