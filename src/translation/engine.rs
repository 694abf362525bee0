/*!
 * Batch translation engine.
 *
 * The engine walks the line range from a start index, groups lines into
 * batches, resolves what it can from the cache, sends the rest to the
 * provider through the response grammar, and reports every outcome as an
 * [`EngineEvent`] on a channel. It never touches the caller's line storage.
 *
 * Batching rules:
 * - a batch holds at most `batch_size` distinct uncached texts
 * - blank lines, cache hits and repeats of a text already in the batch ride
 *   along for free
 * - a batch either validates completely or is not committed at all
 *
 * Cancellation is cooperative and checked between batches, so a request in
 * flight always completes before the run stops.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::errors::TranslationError;
use crate::providers::Provider;
use super::cache::CacheStore;
use super::codec::{self, ResponseGrammar};
use super::rate_limiter::RateLimiter;

/// Settings the engine needs for one run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Target language, used verbatim in cache keys and the instruction
    pub target_language: String,
    /// Provider request ceiling
    pub requests_per_minute: u32,
    /// Maximum distinct uncached texts per request
    pub batch_size: usize,
    /// System prompt template; `{target_language}` is substituted
    pub system_prompt: String,
}

impl EngineSettings {
    /// Reject settings a run cannot start with
    pub fn validate(&self) -> Result<(), TranslationError> {
        if self.requests_per_minute == 0 {
            return Err(TranslationError::Configuration(
                "requests_per_minute must be a positive integer".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TranslationError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.target_language.trim().is_empty() {
            return Err(TranslationError::Configuration(
                "Target language must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn resolved_system_prompt(&self) -> String {
        self.system_prompt.replace("{target_language}", &self.target_language)
    }
}

/// Notification sent from the engine to whoever started it
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Lines `[0, completed)` are done
    Progress { completed: usize, total: usize },
    /// Final text for one line
    LineTranslated { index: usize, text: String },
    /// Non-fatal problem, e.g. a failed cache write
    Warning(String),
    /// Every line was translated
    Finished,
    /// Stopped on request; resume from `resume_index`
    Canceled { resume_index: usize },
    /// Stopped on an error; a manual retry can resume from `resume_index`
    Failed { message: String, resume_index: usize },
}

/// Lifecycle of one engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Finished,
    Canceled { resume_index: usize },
    Failed { resume_index: usize },
}

impl EngineState {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineState::Idle | EngineState::Running)
    }
}

/// Thread-safe stop signal for a running engine
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Ask the engine to stop at the next batch boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lines covered by one provider request
#[derive(Debug)]
struct BatchPlan<'a> {
    start: usize,
    end: usize,
    /// Per line: the text if already known (blank or cached)
    resolved: Vec<Option<String>>,
    /// Distinct uncached source texts, in first-seen order
    pending: Vec<&'a str>,
}

/// Batch translation engine; one instance per run
#[derive(Clone)]
pub struct TranslationEngine {
    settings: EngineSettings,
    provider: Arc<dyn Provider>,
    cache: Arc<dyn CacheStore>,
    grammar: Arc<dyn ResponseGrammar>,
    state: Arc<Mutex<EngineState>>,
    cancel: CancelHandle,
}

impl TranslationEngine {
    /// Create an idle engine; invalid settings are rejected here
    pub fn new(
        settings: EngineSettings,
        provider: Arc<dyn Provider>,
        cache: Arc<dyn CacheStore>,
        grammar: Arc<dyn ResponseGrammar>,
    ) -> Result<Self, TranslationError> {
        settings.validate()?;

        Ok(Self {
            settings,
            provider,
            cache,
            grammar,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            cancel: CancelHandle::default(),
        })
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    /// Signal used to stop the run
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Start translating `sources` from `from_index` on a background task
    ///
    /// Fails with `AlreadyRunning` unless the engine is idle.
    pub fn start(
        &self,
        sources: Vec<String>,
        from_index: usize,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<JoinHandle<EngineState>, TranslationError> {
        self.begin()?;
        let engine = self.clone();
        Ok(tokio::spawn(async move { engine.run_loop(sources, from_index, events).await }))
    }

    /// Translate on the current task and return the terminal state
    pub async fn run(
        &self,
        sources: Vec<String>,
        from_index: usize,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<EngineState, TranslationError> {
        self.begin()?;
        Ok(self.run_loop(sources, from_index, events).await)
    }

    fn begin(&self) -> Result<(), TranslationError> {
        let mut state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(TranslationError::AlreadyRunning);
        }
        *state = EngineState::Running;
        Ok(())
    }

    fn finish(&self, state: EngineState, event: EngineEvent, events: &UnboundedSender<EngineEvent>) -> EngineState {
        *self.state.lock() = state.clone();
        emit(events, event);
        state
    }

    async fn run_loop(
        &self,
        sources: Vec<String>,
        from_index: usize,
        events: UnboundedSender<EngineEvent>,
    ) -> EngineState {
        let total = sources.len();
        let mut cursor = from_index.min(total);

        let mut limiter = match RateLimiter::new(self.settings.requests_per_minute) {
            Ok(limiter) => limiter,
            Err(e) => {
                error!("{}", e);
                return self.finish(
                    EngineState::Failed { resume_index: cursor },
                    EngineEvent::Failed { message: e.to_string(), resume_index: cursor },
                    &events,
                );
            }
        };
        let system_prompt = self.settings.resolved_system_prompt();

        info!(
            "Translating lines {}..{} into {} (batch size {}, {} requests/min)",
            cursor, total, self.settings.target_language, self.settings.batch_size, self.settings.requests_per_minute
        );

        while cursor < total {
            if self.cancel.is_canceled() {
                warn!("Translation canceled, resume at line {}", cursor);
                return self.finish(
                    EngineState::Canceled { resume_index: cursor },
                    EngineEvent::Canceled { resume_index: cursor },
                    &events,
                );
            }

            let plan = self.plan_batch(&sources, cursor).await;
            debug!(
                "Batch {}..{}: {} uncached text(s)",
                plan.start, plan.end, plan.pending.len()
            );

            let end = plan.end;
            if let Err(e) = self.commit_batch(&sources, plan, &mut limiter, &system_prompt, &events).await {
                error!("Translation stopped at line {}: {}", cursor, e);
                return self.finish(
                    EngineState::Failed { resume_index: cursor },
                    EngineEvent::Failed { message: e.to_string(), resume_index: cursor },
                    &events,
                );
            }
            cursor = end;
        }

        info!("Translation finished ({} lines)", total);
        self.finish(EngineState::Finished, EngineEvent::Finished, &events)
    }

    /// Collect lines from `start` until one more distinct uncached text would exceed the batch size
    async fn plan_batch<'a>(&self, sources: &'a [String], start: usize) -> BatchPlan<'a> {
        let mut plan = BatchPlan {
            start,
            end: start,
            resolved: Vec::new(),
            pending: Vec::new(),
        };

        for text in &sources[start..] {
            let text = text.as_str();
            // Blank captions keep their exact text
            let resolved = if text.trim().is_empty() {
                Some(text.to_string())
            } else if plan.pending.contains(&text) {
                None
            } else if let Some(cached) = self.cache.lookup(&self.settings.target_language, text).await {
                Some(cached)
            } else if plan.pending.len() < self.settings.batch_size {
                plan.pending.push(text);
                None
            } else {
                break;
            };

            plan.resolved.push(resolved);
            plan.end += 1;
        }

        plan
    }

    /// Translate the pending texts of a batch and report every line of it
    ///
    /// Nothing is cached or reported unless the whole response validates.
    async fn commit_batch(
        &self,
        sources: &[String],
        plan: BatchPlan<'_>,
        limiter: &mut RateLimiter,
        system_prompt: &str,
        events: &UnboundedSender<EngineEvent>,
    ) -> Result<(), TranslationError> {
        let mut fresh: HashMap<&str, String> = HashMap::new();

        if !plan.pending.is_empty() {
            limiter.wait().await;

            let request = self.grammar.encode(&plan.pending, system_prompt);
            let response = self.provider.complete(request).await?;
            let decoded = self.grammar.decode(&response, plan.pending.len());
            let translations = codec::validate(&plan.pending, decoded)?;

            for (source, translation) in plan.pending.iter().copied().zip(translations) {
                if let Err(e) = self.cache.put(&self.settings.target_language, source, &translation).await {
                    warn!("{}", e);
                    emit(events, EngineEvent::Warning(e.to_string()));
                }
                fresh.insert(source, translation);
            }
        }

        for (offset, resolved) in plan.resolved.into_iter().enumerate() {
            let index = plan.start + offset;
            let text = match resolved {
                Some(text) => text,
                None => fresh.get(sources[index].as_str()).cloned().unwrap_or_default(),
            };
            emit(events, EngineEvent::LineTranslated { index, text });
        }

        emit(events, EngineEvent::Progress { completed: plan.end, total: sources.len() });
        Ok(())
    }
}

fn emit(events: &UnboundedSender<EngineEvent>, event: EngineEvent) {
    if events.send(event).is_err() {
        debug!("Engine event dropped: receiver closed");
    }
}
