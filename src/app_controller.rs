use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::app_config::Config;
use crate::database::Repository;
use crate::providers::{self, Provider};
use crate::session::{SessionCreateParams, SessionInfo, SessionManager};
use crate::subtitle_processor::SubtitleCollection;
use crate::translation::codec::{self, ResponseGrammar};
use crate::translation::{EngineEvent, EngineState, TranslationCache, TranslationEngine};

// @module: Application controller for subtitle translation sessions

/// Options for one translation run
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Subtitle file to translate
    pub input_file: PathBuf,
    /// Output path; defaults to `<stem>.<language>.srt` next to the input
    pub output_file: Option<PathBuf>,
    /// Overwrite an existing output file
    pub force_overwrite: bool,
    /// Discard an interrupted session instead of resuming it
    pub fresh: bool,
}

impl TranslateOptions {
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            ..Self::default()
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every line was translated and written
    Completed { output_file: PathBuf },
    /// The output already existed and overwrite was not requested
    Skipped { output_file: PathBuf },
    /// The run stopped early; the session resumes from `resume_index`
    Interrupted {
        resume_index: usize,
        total_lines: usize,
        /// Diagnostic when the run failed rather than being canceled
        reason: Option<String>,
    },
}

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Cache and session storage
    repository: Repository,
    // @field: Provider used instead of the configured one
    provider_override: Option<Arc<dyn Provider>>,
}

impl Controller {
    // @method: Create a controller backed by the configured database
    pub fn with_config(config: Config) -> Result<Self> {
        let repository = match &config.cache.database_path {
            Some(path) => Repository::open(path)?,
            None => Repository::new_default()?,
        };
        Ok(Self::with_repository(config, repository))
    }

    /// Create a controller over an existing repository
    pub fn with_repository(config: Config, repository: Repository) -> Self {
        Self {
            config,
            repository,
            provider_override: None,
        }
    }

    /// Use the given provider instead of building one from the configuration
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    fn provider(&self) -> Result<Arc<dyn Provider>> {
        match &self.provider_override {
            Some(provider) => Ok(Arc::clone(provider)),
            None => providers::build_provider(&self.config.translation),
        }
    }

    /// Check that the configured provider answers
    pub async fn check_provider(&self) -> Result<()> {
        let provider = self.provider()?;
        provider.test_connection().await.with_context(|| {
            format!(
                "{} is not reachable at {}",
                self.config.translation.provider.display_name(),
                self.config.translation.get_endpoint()
            )
        })?;
        info!(
            "{} - {} is reachable",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );
        Ok(())
    }

    /// Empty the persistent translation cache, returning the number of entries removed
    pub async fn clear_cache(&self) -> Result<i64> {
        let removed = self.repository.clear_cache().await?;
        info!("Removed {} cached translations", removed);
        Ok(removed)
    }

    /// Translate one subtitle file, resuming an interrupted session when there is one
    pub async fn run(&self, options: &TranslateOptions) -> Result<RunOutcome> {
        let start_time = std::time::Instant::now();

        let subtitles = SubtitleCollection::read_srt(&options.input_file)?;
        let output_file = options
            .output_file
            .clone()
            .unwrap_or_else(|| subtitles.translated_path(&self.config.target_language));

        if output_file.exists() && !options.force_overwrite {
            warn!(
                "Skipping file, translation already exists at {} (use -f to force overwrite)",
                output_file.display()
            );
            return Ok(RunOutcome::Skipped { output_file });
        }

        self.config.validate()?;

        let sources = subtitles.source_texts();
        let sessions = SessionManager::new(self.repository.clone());
        let params = SessionCreateParams::new(
            options.input_file.clone(),
            self.config.target_language.clone(),
            self.config.translation.provider.to_lowercase_string(),
            self.config.translation.get_model(),
            sources.len(),
        );
        let resume = sessions.resume_or_create(&params, options.fresh).await?;
        let session = resume.session.clone();

        // Lines of the collection; restored ones are never requested again
        let start_index = resume.start_index();
        let mut lines: Vec<Option<String>> = vec![None; sources.len()];
        for (index, text) in resume.translated_lines {
            if let Some(slot) = lines.get_mut(index) {
                *slot = Some(text);
            }
        }

        let engine = self.build_engine()?;
        info!(
            "Subtide: {} - {} -> {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model(),
            self.config.target_language
        );

        let progress_bar = Self::progress_bar(sources.len(), start_index);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = engine.start(sources, start_index, tx)?;
        let cancel = engine.cancel_handle();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;
        let mut failure: Option<String> = None;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let EngineEvent::Failed { message, .. } = &event {
                        failure = Some(message.clone());
                    }
                    self.handle_event(&sessions, &session, &mut lines, &progress_bar, event).await;
                }
                _ = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    progress_bar.set_message("Stopping after the current batch");
                    warn!("Interrupt received, stopping after the current batch");
                    cancel.cancel();
                }
            }
        }

        let state = run.await.context("Translation task panicked")?;
        progress_bar.finish_and_clear();

        match state {
            EngineState::Finished => {
                let translations = lines
                    .into_iter()
                    .enumerate()
                    .map(|(index, line)| {
                        line.ok_or_else(|| anyhow!("Line {} has no translation, output not written", index + 1))
                    })
                    .collect::<Result<Vec<String>>>()?;
                subtitles.with_translations(&translations).write_to_srt(&output_file)?;
                sessions.complete_session(&session.id, translations.len()).await?;

                info!(
                    "Translation completed in {}.",
                    Self::format_duration(start_time.elapsed())
                );
                info!("Success: {}", output_file.display());
                Ok(RunOutcome::Completed { output_file })
            }
            EngineState::Canceled { resume_index } => {
                sessions.pause_session(&session.id, resume_index, None).await?;
                info!(
                    "Translation paused at line {} of {}; run the same command again to resume",
                    resume_index,
                    session.total_lines
                );
                Ok(RunOutcome::Interrupted {
                    resume_index,
                    total_lines: session.total_lines,
                    reason: None,
                })
            }
            EngineState::Failed { resume_index } => {
                let reason = failure.unwrap_or_else(|| "translation failed".to_string());
                sessions
                    .pause_session(&session.id, resume_index, Some(reason.clone()))
                    .await?;
                error!(
                    "Translation stopped at line {} of {}: {}",
                    resume_index, session.total_lines, reason
                );
                Ok(RunOutcome::Interrupted {
                    resume_index,
                    total_lines: session.total_lines,
                    reason: Some(reason),
                })
            }
            EngineState::Idle | EngineState::Running => {
                Err(anyhow!("Translation ended in unexpected state {:?}", state))
            }
        }
    }

    fn build_engine(&self) -> Result<TranslationEngine> {
        let cache = Arc::new(TranslationCache::for_mode(self.config.cache.mode, &self.repository));
        let grammar: Arc<dyn ResponseGrammar> =
            Arc::from(codec::grammar_for(self.config.translation.common.response_format));
        let engine = TranslationEngine::new(self.config.engine_settings(), self.provider()?, cache, grammar)?;
        Ok(engine)
    }

    async fn handle_event(
        &self,
        sessions: &SessionManager,
        session: &SessionInfo,
        lines: &mut [Option<String>],
        progress_bar: &ProgressBar,
        event: EngineEvent,
    ) {
        match event {
            EngineEvent::LineTranslated { index, text } => {
                if let Err(e) = sessions.record_line(&session.id, index, &text).await {
                    warn!("Failed to store line {}: {}", index, e);
                }
                if let Some(slot) = lines.get_mut(index) {
                    *slot = Some(text);
                }
            }
            EngineEvent::Progress { completed, total } => {
                progress_bar.set_length(total as u64);
                progress_bar.set_position(completed as u64);
                if let Err(e) = sessions.record_progress(&session.id, completed).await {
                    warn!("Failed to store progress: {}", e);
                }
            }
            EngineEvent::Warning(message) => {
                progress_bar.suspend(|| warn!("{}", message));
            }
            EngineEvent::Finished => debug!("Engine finished"),
            EngineEvent::Canceled { resume_index } => debug!("Engine canceled at {}", resume_index),
            EngineEvent::Failed { message, resume_index } => {
                debug!("Engine failed at {}: {}", resume_index, message)
            }
        }
    }

    fn progress_bar(total: usize, position: usize) -> ProgressBar {
        let progress_bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} lines ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_position(position as u64);
        progress_bar.set_message("Translating");
        progress_bar
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
