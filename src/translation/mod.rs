/*!
 * Batch translation core.
 *
 * - `cache`: translation cache keyed by (target language, source text)
 * - `rate_limiter`: pacing of provider requests
 * - `codec`: batch framing and response parsing behind a pluggable grammar
 * - `engine`: the state machine driving a run from a start index
 */

pub mod cache;
pub mod codec;
pub mod engine;
pub mod rate_limiter;

// Re-export main types for easier usage
pub use self::cache::{CacheStore, TranslationCache};
pub use self::codec::{JsonArrayGrammar, NumberedDelimiterGrammar, ResponseGrammar};
pub use self::engine::{CancelHandle, EngineEvent, EngineSettings, EngineState, TranslationEngine};
pub use self::rate_limiter::RateLimiter;
