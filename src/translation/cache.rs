/*!
 * Translation caching functionality.
 *
 * Translations are keyed by (target language, source text). Once an entry is
 * written it is reused for the rest of the run; only an explicit clear
 * removes it. Three modes share one interface:
 * - volatile: in-memory only
 * - persistent: in-memory map written through to SQLite on every `put`
 * - disabled: never finds anything, stores nothing
 */

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::CacheMode;
use crate::database::Repository;
use crate::database::models::CacheRecord;
use crate::errors::TranslationError;

/// Lookup and storage of finished translations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Find the translation of `source_text` into `target_language`
    async fn lookup(&self, target_language: &str, source_text: &str) -> Option<String>;

    /// Store a translation
    ///
    /// An error means only the durable copy was lost; the entry stays
    /// usable for the rest of the run.
    async fn put(&self, target_language: &str, source_text: &str, translation: &str) -> Result<(), TranslationError>;

    /// Remove every entry
    async fn clear(&self) -> Result<(), TranslationError>;
}

/// Cache key combining target language and source text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    target_language: String,
    source_text: String,
}

impl CacheKey {
    fn new(target_language: &str, source_text: &str) -> Self {
        Self {
            target_language: target_language.to_string(),
            source_text: source_text.to_string(),
        }
    }
}

/// Translation cache for storing and retrieving translations
pub struct TranslationCache {
    /// Operating mode
    mode: CacheMode,

    /// In-memory entries
    entries: RwLock<HashMap<CacheKey, String>>,

    /// Durable storage, persistent mode only
    repository: Option<Repository>,

    /// Cache hit counter
    hits: AtomicUsize,

    /// Cache miss counter
    misses: AtomicUsize,
}

impl TranslationCache {
    fn with_mode(mode: CacheMode, repository: Option<Repository>) -> Self {
        Self {
            mode,
            entries: RwLock::new(HashMap::new()),
            repository,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// In-memory cache that lives as long as the process
    pub fn volatile() -> Self {
        Self::with_mode(CacheMode::Volatile, None)
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::with_mode(CacheMode::Disabled, None)
    }

    /// Cache written through to the database
    pub fn persistent(repository: Repository) -> Self {
        Self::with_mode(CacheMode::Persistent, Some(repository))
    }

    /// Cache for a configured mode; the repository is only used in persistent mode
    pub fn for_mode(mode: CacheMode, repository: &Repository) -> Self {
        match mode {
            CacheMode::Volatile => Self::volatile(),
            CacheMode::Persistent => Self::persistent(repository.clone()),
            CacheMode::Disabled => Self::disabled(),
        }
    }

    /// Operating mode
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Get cache statistics: hits, misses and hit rate
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the in-memory cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn record(&self, found: bool) {
        let counter = if found { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheStore for TranslationCache {
    async fn lookup(&self, target_language: &str, source_text: &str) -> Option<String> {
        if self.mode == CacheMode::Disabled {
            return None;
        }

        let key = CacheKey::new(target_language, source_text);
        let in_memory = self.entries.read().get(&key).cloned();
        if let Some(translation) = in_memory {
            debug!("Cache hit for '{}' ({})", truncate_text(source_text, 30), target_language);
            self.record(true);
            return Some(translation);
        }

        let stored = match &self.repository {
            Some(repository) => match repository.get_cached_translation(source_text, target_language).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Cache lookup failed, treating as miss: {}", e);
                    None
                }
            },
            None => None,
        };

        match stored {
            Some(translation) => {
                debug!("Stored cache hit for '{}' ({})", truncate_text(source_text, 30), target_language);
                self.entries.write().insert(key, translation.clone());
                self.record(true);
                Some(translation)
            }
            None => {
                debug!("Cache miss for '{}' ({})", truncate_text(source_text, 30), target_language);
                self.record(false);
                None
            }
        }
    }

    async fn put(&self, target_language: &str, source_text: &str, translation: &str) -> Result<(), TranslationError> {
        if self.mode == CacheMode::Disabled {
            return Ok(());
        }

        self.entries
            .write()
            .insert(CacheKey::new(target_language, source_text), translation.to_string());

        if let Some(repository) = &self.repository {
            let record = CacheRecord::new(
                Repository::hash_text(source_text),
                source_text.to_string(),
                target_language.to_string(),
                translation.to_string(),
            );
            repository
                .cache_translation(&record)
                .await
                .map_err(|e| TranslationError::CacheWrite(format!("{:#}", e)))?;
        }

        debug!("Cached translation for '{}' ({})", truncate_text(source_text, 30), target_language);
        Ok(())
    }

    async fn clear(&self) -> Result<(), TranslationError> {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        if let Some(repository) = &self.repository {
            let deleted = repository
                .clear_cache()
                .await
                .map_err(|e| TranslationError::CacheWrite(format!("{:#}", e)))?;
            debug!("Removed {} stored cache entries", deleted);
        }

        debug!("Translation cache cleared");
        Ok(())
    }
}

/// Truncate text to a maximum number of characters with ellipsis
fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
