/*!
 * Batch codec: turns a group of source lines into one provider request and
 * recovers the per-line translations from the provider's single text answer.
 *
 * Providers give no structured-output guarantee, so the wire convention is
 * abstracted behind [`ResponseGrammar`]. The default grammar numbers lines and
 * joins them with a rare delimiter; a JSON-array grammar is available for
 * providers that follow structured instructions reliably.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Debug;

use crate::app_config::ResponseFormat;
use crate::errors::TranslationError;
use crate::providers::CompletionRequest;

/// Delimiter placed between numbered lines
pub const DEFAULT_DELIMITER: &str = "|||";

static NUMBERED_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(\d+)\.\s*(.*?)\s*$").unwrap()
});

/// Wire convention between the engine and a provider
pub trait ResponseGrammar: Send + Sync + Debug {
    /// Build one request carrying every source text, in order
    fn encode(&self, sources: &[&str], system_prompt: &str) -> CompletionRequest;

    /// Map a raw response back to `expected` positions; `None` marks a position
    /// the response did not answer
    fn decode(&self, response: &str, expected: usize) -> Vec<Option<String>>;
}

/// Numbered lines joined by a delimiter, e.g. `1. Hello\n|||\n2. World`
#[derive(Debug, Clone)]
pub struct NumberedDelimiterGrammar {
    delimiter: String,
}

impl NumberedDelimiterGrammar {
    /// Grammar using a custom delimiter
    pub fn with_delimiter(delimiter: impl Into<String>) -> Self {
        Self { delimiter: delimiter.into() }
    }

    /// Delimiter in use
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    fn instruction(&self, count: usize) -> String {
        format!(
            "The input contains {count} numbered lines separated by \"{d}\". \
             Translate each line and answer with exactly {count} lines, \
             each starting with the same number followed by a period, \
             separated by \"{d}\". Do not merge, split or skip lines and do not add any other text.",
            count = count,
            d = self.delimiter
        )
    }
}

impl Default for NumberedDelimiterGrammar {
    fn default() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }
}

impl ResponseGrammar for NumberedDelimiterGrammar {
    fn encode(&self, sources: &[&str], system_prompt: &str) -> CompletionRequest {
        if sources.len() == 1 {
            return CompletionRequest::new(
                format!("{}\n\n{}", system_prompt, SINGLE_LINE_INSTRUCTION),
                sources[0],
            );
        }

        let separator = format!("\n{}\n", self.delimiter);
        let prompt = sources
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}. {}", i + 1, text))
            .collect::<Vec<_>>()
            .join(&separator);

        CompletionRequest::new(
            format!("{}\n\n{}", system_prompt, self.instruction(sources.len())),
            prompt,
        )
    }

    fn decode(&self, response: &str, expected: usize) -> Vec<Option<String>> {
        if expected == 1 {
            return vec![non_empty(response.trim())];
        }

        let mut slots: Vec<Option<String>> = vec![None; expected];
        for fragment in response.split(self.delimiter.as_str()) {
            let Some((number, text)) = parse_numbered(fragment) else {
                if !fragment.trim().is_empty() {
                    debug!("Discarding unnumbered response fragment: {:?}", fragment.trim());
                }
                continue;
            };

            if number == 0 || number > expected {
                debug!("Discarding fragment with out-of-range number {}", number);
                continue;
            }

            // First answer for a position wins
            let slot = &mut slots[number - 1];
            if slot.is_none() {
                *slot = non_empty(text);
            }
        }

        slots
    }
}

const SINGLE_LINE_INSTRUCTION: &str =
    "Answer with the translation of the input only, without numbering, quotes or comments.";

/// JSON array of strings in, JSON array of strings out
#[derive(Debug, Clone, Default)]
pub struct JsonArrayGrammar;

impl ResponseGrammar for JsonArrayGrammar {
    fn encode(&self, sources: &[&str], system_prompt: &str) -> CompletionRequest {
        let prompt = serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string());
        CompletionRequest::new(
            format!(
                "{}\n\nThe input is a JSON array of {} strings. Answer with a JSON array of the same length \
                 containing the translations in the same order, and nothing else.",
                system_prompt,
                sources.len()
            ),
            prompt,
        )
    }

    fn decode(&self, response: &str, expected: usize) -> Vec<Option<String>> {
        // Models like to wrap JSON in prose or code fences; the first array wins
        let Some(start) = response.find('[') else {
            return vec![None; expected];
        };

        let first = serde_json::Deserializer::from_str(&response[start..])
            .into_iter::<Vec<String>>()
            .next();
        let mut values: Vec<Option<String>> = match first {
            Some(Ok(values)) => values.into_iter().map(|v| non_empty(v.trim())).collect(),
            Some(Err(e)) => {
                debug!("Discarding non-array JSON response: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };
        values.resize(expected, None);
        values
    }
}

/// Grammar selected by configuration
pub fn grammar_for(format: ResponseFormat) -> Box<dyn ResponseGrammar> {
    match format {
        ResponseFormat::Numbered => Box::new(NumberedDelimiterGrammar::default()),
        ResponseFormat::Json => Box::new(JsonArrayGrammar),
    }
}

/// Parse a `<number>. <text>` fragment
pub fn parse_numbered(fragment: &str) -> Option<(usize, &str)> {
    let captures = NUMBERED_FRAGMENT.captures(fragment)?;
    let number = captures.get(1)?.as_str().parse().ok()?;
    let text = captures.get(2)?.as_str();
    Some((number, text))
}

/// Require an answer for every position; the error names the first unanswered source
pub fn validate(sources: &[&str], decoded: Vec<Option<String>>) -> Result<Vec<String>, TranslationError> {
    sources
        .iter()
        .zip(decoded.into_iter().chain(std::iter::repeat(None)))
        .map(|(source, translation)| {
            translation.ok_or_else(|| TranslationError::Validation {
                source_text: (*source).to_string(),
            })
        })
        .collect()
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() { None } else { Some(text.to_string()) }
}
