use anyhow::{Context, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};
use xxhash_rust::xxh3::xxh3_64;

use super::Translator;
use crate::core::errors::TranslationResult;
use crate::core::language::Language;
use crate::utils::Metrics;

const CACHE_FILE_NAME: &str = "translations.json";

/// Cache entry for translation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    original_text: String,
    translated_text: String,
}

/// LRU translation cache with optional JSON persistence.
///
/// Entries are keyed by xxHash3 of (source, target, text). Nothing is written
/// to disk until [`TranslationCache::save`] is called, and only when the
/// cache was opened with a directory.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    cache: RwLock<LruCache<String, CacheEntry>>,
    cache_file: Option<PathBuf>,
    dirty: AtomicBool,
    metrics: Option<Metrics>,
}

impl TranslationCache {
    /// Open the cache, loading `<cache_dir>/translations.json` if present
    pub async fn open(
        cache_dir: Option<&Path>,
        max_entries: usize,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        let max = NonZeroUsize::new(max_entries).context("max_entries must be > 0")?;
        let mut lru = LruCache::new(max);

        let cache_file = match cache_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .context("Failed to create cache directory")?;
                Some(dir.join(CACHE_FILE_NAME))
            }
            None => None,
        };

        if let Some(ref file) = cache_file {
            if tokio::fs::try_exists(file).await.unwrap_or(false) {
                let data = tokio::fs::read_to_string(file)
                    .await
                    .context("Failed to read cache file")?;
                // A corrupt cache file is discarded rather than fatal
                let entries: HashMap<String, CacheEntry> =
                    serde_json::from_str(&data).unwrap_or_default();
                for (k, v) in entries {
                    lru.put(k, v);
                }
                debug!("Loaded {} cached translations", lru.len());
            }
        }

        if let Some(ref m) = metrics {
            m.update_cache_size(lru.len());
        }

        Ok(Self {
            inner: Arc::new(CacheInner {
                cache: RwLock::new(lru),
                cache_file,
                dirty: AtomicBool::new(false),
                metrics,
            }),
        })
    }

    /// In-memory cache without persistence
    pub fn in_memory(max_entries: usize) -> Self {
        let max = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(CacheInner {
                cache: RwLock::new(LruCache::new(max)),
                cache_file: None,
                dirty: AtomicBool::new(false),
                metrics: None,
            }),
        }
    }

    /// Generate cache key from the language pair and text using xxHash3
    pub fn generate_key(text: &str, source: Language, target: Language) -> String {
        let mut hash_input = Vec::with_capacity(text.len() + 16);
        hash_input.extend_from_slice(source.iso_code().as_bytes());
        hash_input.push(0);
        hash_input.extend_from_slice(target.iso_code().as_bytes());
        hash_input.push(0);
        hash_input.extend_from_slice(text.as_bytes());

        format!("{:016x}", xxh3_64(&hash_input))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.cache.write();
        let hit = cache.get(key).map(|entry| entry.translated_text.clone());

        if let Some(ref m) = self.inner.metrics {
            if hit.is_some() {
                m.record_cache_hit();
            } else {
                m.record_cache_miss();
            }
        }
        hit
    }

    pub fn put(&self, key: String, original_text: &str, translated_text: &str) {
        let entry = CacheEntry {
            original_text: original_text.to_string(),
            translated_text: translated_text.to_string(),
        };

        {
            let mut cache = self.inner.cache.write();
            cache.put(key, entry);

            if let Some(ref m) = self.inner.metrics {
                m.update_cache_size(cache.len());
            }
        }

        self.inner.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.inner.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache to disk if anything changed since the last save
    pub async fn save(&self) -> Result<()> {
        let Some(ref cache_file) = self.inner.cache_file else {
            return Ok(());
        };
        if !self.inner.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let cache_data: HashMap<String, CacheEntry> = {
            let cache = self.inner.cache.read();
            cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let json = serde_json::to_string_pretty(&cache_data).context("Failed to serialize cache")?;

        // Write to a sibling and rename so a crash never leaves half a file
        let tmp = cache_file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .context("Failed to write cache file")?;
        tokio::fs::rename(&tmp, cache_file)
            .await
            .context("Failed to replace cache file")?;

        Ok(())
    }

    pub fn clear(&self) {
        self.inner.cache.write().clear();
        self.inner.dirty.store(true, Ordering::Release);

        if let Some(ref m) = self.inner.metrics {
            m.update_cache_size(0);
        }
    }
}

/// Wraps a translator with the cache. Only successful translations are
/// stored, so a provider error is retried on the next call.
pub struct CachedTranslator {
    inner: Arc<dyn Translator>,
    cache: TranslationCache,
    metrics: Option<Metrics>,
}

impl CachedTranslator {
    pub fn new(inner: Arc<dyn Translator>, cache: TranslationCache, metrics: Option<Metrics>) -> Self {
        Self { inner, cache, metrics }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }
}

#[async_trait]
impl Translator for CachedTranslator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(skip(self, text), fields(backend = self.inner.name()))]
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> TranslationResult<String> {
        let key = TranslationCache::generate_key(text, source, target);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let result = self.inner.translate(text, source, target).await;
        if let Some(ref m) = self.metrics {
            m.record_translation_call(result.is_ok(), start.elapsed());
        }

        let translated = result?;
        self.cache.put(key, text, &translated);
        Ok(translated)
    }

    async fn flush(&self) -> Result<()> {
        self.cache.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingTranslator;

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = TranslationCache::in_memory(100);
        let key = TranslationCache::generate_key("こんにちは", Language::Japanese, Language::English);
        cache.put(key.clone(), "こんにちは", "Hello");

        assert_eq!(cache.get(&key).as_deref(), Some("Hello"));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_xxhash_generation() {
        let key1 = TranslationCache::generate_key("test", Language::Japanese, Language::English);
        let key2 = TranslationCache::generate_key("test", Language::Japanese, Language::English);
        let key3 = TranslationCache::generate_key("test", Language::Japanese, Language::French);

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = TranslationCache::in_memory(2);
        cache.put("a".into(), "a", "A");
        cache.put("b".into(), "b", "B");
        cache.put("c".into(), "c", "C");
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Metrics::new();

        let cache = TranslationCache::open(Some(dir.path()), 10, Some(metrics.clone()))
            .await
            .unwrap();
        cache.put("k".into(), "猫", "cat");
        cache.save().await.unwrap();

        let reopened = TranslationCache::open(Some(dir.path()), 10, None).await.unwrap();
        assert_eq!(reopened.get("k").as_deref(), Some("cat"));
        assert_eq!(metrics.snapshot().cache_size, 1);
    }

    #[tokio::test]
    async fn test_cached_translator_calls_backend_once() {
        let backend = Arc::new(CountingTranslator::default());
        let translator =
            CachedTranslator::new(backend.clone(), TranslationCache::in_memory(10), None);

        for _ in 0..3 {
            let out = translator
                .translate("猫", Language::Japanese, Language::English)
                .await
                .unwrap();
            assert_eq!(out, "[en] 猫");
        }
        assert_eq!(backend.calls(), 1);
    }
}
