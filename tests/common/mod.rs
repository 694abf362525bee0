/*!
 * Common test utilities for the subtide test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use subtide::app_config::{Config, TranslationProvider};
use subtide::providers::Provider;
use subtide::translation::codec::NumberedDelimiterGrammar;
use subtide::translation::{
    CacheStore, EngineEvent, EngineSettings, EngineState, TranslationCache, TranslationEngine,
};

/// Route library logs to the test output; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// SRT content with one block per text, one second apart
pub fn srt_content(texts: &[&str]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            format!(
                "{}\n00:00:{:02},000 --> 00:00:{:02},500\n{}\n\n",
                i + 1,
                i,
                i,
                text
            )
        })
        .collect()
}

/// Creates a subtitle file with one block per text
pub fn create_test_subtitle(dir: &Path, filename: &str, texts: &[&str]) -> Result<PathBuf> {
    create_test_file(dir, filename, &srt_content(texts))
}

/// Engine settings with a batch size and a rate that never slows a test down
pub fn settings(batch_size: usize) -> EngineSettings {
    EngineSettings {
        target_language: "French".to_string(),
        requests_per_minute: 60_000,
        batch_size,
        system_prompt: "Translate into {target_language}.".to_string(),
    }
}

/// Configuration for controller tests: fast rate limit, database under `dir`
pub fn test_config(dir: &Path, batch_size: usize) -> Config {
    init_logging();
    let mut config = Config::default();
    config.target_language = "French".to_string();
    config.translation.provider = TranslationProvider::Ollama;
    config.translation.common.batch_size = batch_size;
    config.translation.common.requests_per_minute = 60_000;
    config.translation.provider_config_mut(TranslationProvider::Ollama).rate_limit = Some(60_000);
    config.cache.database_path = Some(dir.join("subtide.db"));
    config
}

/// Owned source lines
pub fn lines(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

/// Engine with the default numbered grammar
pub fn engine(
    settings: EngineSettings,
    provider: Arc<dyn Provider>,
    cache: Arc<dyn CacheStore>,
) -> TranslationEngine {
    TranslationEngine::new(settings, provider, cache, Arc::new(NumberedDelimiterGrammar::default()))
        .expect("valid settings")
}

/// Engine over a fresh volatile cache
pub fn engine_with_volatile_cache(batch_size: usize, provider: Arc<dyn Provider>) -> TranslationEngine {
    engine(settings(batch_size), provider, Arc::new(TranslationCache::volatile()))
}

/// Run an engine to completion and collect every notification it sent
pub async fn run_collecting(
    engine: &TranslationEngine,
    sources: Vec<String>,
    from_index: usize,
) -> (EngineState, Vec<EngineEvent>) {
    init_logging();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let state = engine.run(sources, from_index, tx).await.expect("engine starts");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (state, events)
}

/// `(index, text)` of every line notification, in emission order
pub fn translated_lines(events: &[EngineEvent]) -> Vec<(usize, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::LineTranslated { index, text } => Some((*index, text.clone())),
            _ => None,
        })
        .collect()
}

/// Every `completed` value from progress notifications
pub fn progress_values(events: &[EngineEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Progress { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect()
}
