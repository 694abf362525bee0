/*!
 * # Subtide - batch subtitle translation with AI
 *
 * A Rust library for translating subtitle files through AI providers in
 * rate-limited batches, with a translation cache and resumable sessions.
 *
 * ## Features
 *
 * - Translate subtitles using various AI providers:
 *   - Ollama (local LLM)
 *   - OpenAI API and LM Studio
 *   - Anthropic API
 * - Batches of distinct uncached lines per request, paced by a rate limiter
 * - Translation cache keyed by target language and source text
 * - Strict validation of every batch answer
 * - Cancellation and resume from the first untranslated line
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT parsing and writing
 * - `translation`: the batch translation core:
 *   - `translation::engine`: run state machine and notifications
 *   - `translation::codec`: batch framing and response parsing
 *   - `translation::cache`: translation cache
 *   - `translation::rate_limiter`: request pacing
 * - `providers`: Client implementations for various LLM providers
 * - `database`: SQLite storage for the cache and sessions
 * - `session`: resumable translation sessions
 * - `app_controller`: Main application controller
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod providers;
pub mod session;
pub mod subtitle_processor;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunOutcome, TranslateOptions};
pub use errors::{AppError, ProviderError, SubtitleError, TranslationError};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
pub use translation::{EngineEvent, EngineSettings, EngineState, TranslationEngine};
