/*!
 * Mock provider for testing.
 *
 * The mock understands the numbered batch framing, so a test can describe a
 * translation per line and get back a well-formed batch answer:
 * - `MockProvider::working()` - translates every line with a fixed marker
 * - `MockProvider::dictionary(..)` - translates from a word list
 * - `MockProvider::scripted(..)` - replays raw responses in order
 * - `MockProvider::unreachable()` - always fails with a connection error
 *
 * Every request is recorded so tests can count provider calls and inspect
 * which source lines were actually sent.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, Provider};
use crate::translation::codec::{DEFAULT_DELIMITER, parse_numbered};

/// Per-line translation function
pub type TranslateFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Hook invoked with the 1-based call number when a request arrives
pub type CallHook = Box<dyn Fn(usize) + Send + Sync>;

enum Responder {
    /// Translate each line of the request
    Translate(TranslateFn),
    /// Replay queued responses
    Scripted(Mutex<VecDeque<Result<String, ProviderError>>>),
    /// Always fail
    Fail(fn() -> ProviderError),
}

/// Mock provider for testing engine behavior
pub struct MockProvider {
    responder: Responder,
    /// Every request received, in order
    requests: Mutex<Vec<CompletionRequest>>,
    /// Numbers left out of batch answers
    omitted: HashSet<usize>,
    /// Errors returned instead of an answer on specific calls
    failures: Mutex<HashMap<usize, ProviderError>>,
    /// Simulated latency
    delay: Option<Duration>,
    on_call: Option<CallHook>,
}

impl MockProvider {
    fn with_responder(responder: Responder) -> Self {
        Self {
            responder,
            requests: Mutex::new(Vec::new()),
            omitted: HashSet::new(),
            failures: Mutex::new(HashMap::new()),
            delay: None,
            on_call: None,
        }
    }

    /// Translate each line to `[tr] <line>`
    pub fn working() -> Self {
        Self::translating(|text| format!("[tr] {}", text))
    }

    /// Translate each line with the given function
    pub fn translating(translate: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::with_responder(Responder::Translate(Arc::new(translate)))
    }

    /// Translate from a word list, falling back to `[tr] <line>`
    pub fn dictionary(entries: &[(&str, &str)]) -> Self {
        let words: HashMap<String, String> = entries
            .iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect();
        Self::translating(move |text| {
            words.get(text).cloned().unwrap_or_else(|| format!("[tr] {}", text))
        })
    }

    /// Replay raw responses; once exhausted every call fails
    pub fn scripted(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self::with_responder(Responder::Scripted(Mutex::new(responses.into())))
    }

    /// Provider that can never be reached
    pub fn unreachable() -> Self {
        Self::with_responder(Responder::Fail(|| {
            ProviderError::ConnectionError("connection refused".to_string())
        }))
    }

    /// Leave the given 1-based line number out of every batch answer
    pub fn omit_line(mut self, number: usize) -> Self {
        self.omitted.insert(number);
        self
    }

    /// Fail the given 1-based call with `error`
    pub fn fail_on_call(self, call: usize, error: ProviderError) -> Self {
        self.failures.lock().insert(call, error);
        self
    }

    /// Delay every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Run `hook` as each request arrives, before answering
    pub fn on_call(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    /// Number of requests received
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Copy of every request received
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Source lines carried by every request, in send order
    pub fn requested_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .flat_map(|request| split_prompt(&request.prompt))
            .map(|(_, text)| text)
            .collect()
    }

    fn answer(&self, prompt: &str, translate: &TranslateFn) -> String {
        let lines = split_prompt(prompt);
        if lines.len() == 1 && lines[0].0.is_none() {
            return translate(&lines[0].1);
        }

        lines
            .into_iter()
            .filter_map(|(number, text)| {
                let number = number?;
                if self.omitted.contains(&number) {
                    return None;
                }
                Some(format!("{}. {}", number, translate(&text)))
            })
            .collect::<Vec<_>>()
            .join(&format!("\n{}\n", DEFAULT_DELIMITER))
    }
}

/// Split a batch prompt into `(number, text)`; a single unnumbered line has no number
fn split_prompt(prompt: &str) -> Vec<(Option<usize>, String)> {
    let numbered: Vec<(Option<usize>, String)> = prompt
        .split(DEFAULT_DELIMITER)
        .filter_map(parse_numbered)
        .map(|(number, text)| (Some(number), text.to_string()))
        .collect();

    if numbered.len() > 1 || prompt.contains(DEFAULT_DELIMITER) {
        numbered
    } else {
        vec![(None, prompt.to_string())]
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("calls", &self.call_count())
            .field("omitted", &self.omitted)
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(hook) = &self.on_call {
            hook(call);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().remove(&call);
        if let Some(error) = failure {
            return Err(error);
        }

        match &self.responder {
            Responder::Translate(translate) => Ok(self.answer(&request.prompt, translate)),
            Responder::Scripted(queue) => {
                let next = queue.lock().pop_front();
                next.unwrap_or_else(|| {
                    Err(ProviderError::RequestFailed("no scripted response left".to_string()))
                })
            }
            Responder::Fail(make_error) => Err(make_error()),
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.responder {
            Responder::Fail(make_error) => Err(make_error()),
            _ => Ok(()),
        }
    }
}
