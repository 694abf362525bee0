/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for various LLM providers:
 * - Ollama: Local LLM server
 * - OpenAI: OpenAI API integration (also used for LM Studio)
 * - Anthropic: Anthropic API integration
 * - Mock: scripted provider for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

/// A single text request sent to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction
    pub system: String,
    /// User prompt carrying the encoded batch
    pub prompt: String,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Common trait for all LLM providers
///
/// The engine treats a provider as a black box: text in, text out, or an error.
/// Credentials, endpoint and call timeout are fixed at construction.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The raw response text or an error
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Shared retry policy for server-side failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Base backoff, doubled on each retry
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self { max_retries: 0, backoff_base_ms: 0 }
    }

    /// Backoff before the given retry attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(16)))
    }

    /// Run `call`, retrying only server errors (5xx)
    pub async fn run<F, Fut>(&self, mut call: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<String, ProviderError>> + Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(ProviderError::ApiError { status_code, message })
                    if status_code >= 500 && attempt < self.max_retries =>
                {
                    attempt += 1;
                    log::warn!(
                        "Provider server error ({}): {} - retry {}/{}",
                        status_code, message, attempt, self.max_retries
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                other => return other,
            }
        }
    }
}

/// Build the provider client selected by the configuration
pub fn build_provider(config: &TranslationConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let model = config.get_model();
    let endpoint = config.get_endpoint();
    let timeout = Duration::from_secs(config.get_timeout_secs());
    let retry = RetryPolicy {
        max_retries: config.common.retry_count,
        backoff_base_ms: config.common.retry_backoff_ms,
    };
    let temperature = config.common.temperature;

    let provider: Arc<dyn Provider> = match config.provider {
        TranslationProvider::Ollama => Arc::new(
            ollama::Ollama::from_endpoint(&endpoint, model, timeout)?
                .with_retry(retry)
                .with_temperature(temperature),
        ),
        TranslationProvider::OpenAI => Arc::new(
            openai::OpenAI::new(config.get_api_key(), endpoint, model, timeout)
                .with_retry(retry)
                .with_temperature(temperature),
        ),
        TranslationProvider::LMStudio => {
            // LM Studio often doesn't require an API key; use a default if empty
            let api_key = {
                let k = config.get_api_key();
                if k.is_empty() { "lm-studio".to_string() } else { k }
            };
            Arc::new(
                openai::OpenAI::new(api_key, endpoint, model, timeout)
                    .with_retry(retry)
                    .with_temperature(temperature),
            )
        }
        TranslationProvider::Anthropic => Arc::new(
            anthropic::Anthropic::new(config.get_api_key(), endpoint, model, timeout)
                .with_retry(retry)
                .with_temperature(temperature),
        ),
    };

    Ok(provider)
}

/// Read a non-success response body into a classified provider error
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let error_text = response.text().await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    ProviderError::from_status(status, error_text)
}
