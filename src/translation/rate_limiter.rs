/*!
 * Request pacing.
 *
 * Consecutive dispatches are spaced at least `60s / requests_per_minute`
 * apart. There is no burst allowance: requests skipped thanks to cache hits
 * do not earn credit for later ones.
 */

use std::time::Duration;
use tokio::time::Instant;

use crate::errors::TranslationError;

const NANOS_PER_MINUTE: u64 = 60_000_000_000;

/// Paces outgoing provider requests
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Minimum spacing between two dispatches
    min_interval: Duration,
    /// When the previous dispatch was released
    last_dispatch: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter for a requests-per-minute ceiling
    pub fn new(requests_per_minute: u32) -> Result<Self, TranslationError> {
        if requests_per_minute == 0 {
            return Err(TranslationError::Configuration(
                "requests_per_minute must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            // Rounded up so the spacing never drops below 60s / rpm
            min_interval: Duration::from_nanos(NANOS_PER_MINUTE.div_ceil(u64::from(requests_per_minute))),
            last_dispatch: None,
        })
    }

    /// Minimum spacing between two dispatches
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next dispatch is allowed, then record it
    ///
    /// The first call never waits.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_dispatch {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        self.last_dispatch = Some(Instant::now());
    }
}
