//! Request/response types for the LLM generation endpoint.
//!
//! The concrete transport is an Ollama-shaped `/api/generate` endpoint (the
//! wire grounding recorded in SPEC_FULL.md §4.1): `{model, prompt, stream,
//! format, keep_alive, options: {temperature, top_p}}` in, either a unary
//! `{response, done: true, eval_count, ...}` object or newline-delimited
//! `{response: "<token>", done: false}` chunks terminated by one `{done:
//! true, ...}` chunk.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call options, mirroring the teacher's `CompletionRequest` builder
/// shape.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub keep_alive: String,
    /// When `Some("json")`, demands the server return a syntactically valid
    /// JSON document.
    pub format: Option<String>,
    #[serde(skip)]
    pub request_timeout: Duration,
}

impl GenerateOptions {
    /// Defaults tuned for structured extraction (temperature 0.2), per
    /// §4.1's "0.7 for interactive, 0.2 for structured extraction" note.
    pub fn structured(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            top_p: 0.9,
            keep_alive: "30m".to_string(),
            format: Some("json".to_string()),
            request_timeout: Duration::from_secs(300),
        }
    }

    /// Defaults tuned for interactive streaming comparison (temperature
    /// 0.7).
    pub fn interactive(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            top_p: 0.9,
            keep_alive: "30m".to_string(),
            format: None,
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_json_mode(mut self) -> Self {
        self.format = Some("json".to_string());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Metrics contract common to unary and streaming completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Time until the first non-empty token arrived. `None` for unary calls
    /// (there is no "first token" moment to measure).
    pub time_to_first_token: Option<Duration>,
    pub tokens_per_second: f64,
    pub total_time: Duration,
    pub total_tokens: u64,
}

impl PerformanceMetrics {
    pub fn from_ollama_counters(
        eval_count: u64,
        eval_duration_nanos: u64,
        total_duration_nanos: u64,
        time_to_first_token: Option<Duration>,
    ) -> Self {
        let eval_seconds = eval_duration_nanos as f64 / 1e9;
        let tokens_per_second = if eval_seconds > 0.0 {
            eval_count as f64 / eval_seconds
        } else {
            0.0
        };
        Self {
            time_to_first_token,
            tokens_per_second,
            total_time: Duration::from_nanos(total_duration_nanos),
            total_tokens: eval_count,
        }
    }
}

/// One event in the `stream()` async iterator.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token { content: String },
    Complete { performance: PerformanceMetrics },
    Error { message: String },
}

/// Raw unary/terminal-chunk response shape from the generation endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaGenerateResponse {
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration: u64,
    #[serde(default)]
    pub total_duration: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct OllamaGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'a str>,
    pub keep_alive: &'a str,
    pub options: OllamaOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct OllamaOptions {
    pub temperature: f32,
    pub top_p: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_defaults_enable_json_mode() {
        let opts = GenerateOptions::structured("llama3");
        assert_eq!(opts.temperature, 0.2);
        assert_eq!(opts.format.as_deref(), Some("json"));
    }

    #[test]
    fn interactive_defaults_disable_json_mode() {
        let opts = GenerateOptions::interactive("llama3");
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.format, None);
    }

    #[test]
    fn tokens_per_second_from_counters() {
        let metrics =
            PerformanceMetrics::from_ollama_counters(100, 1_000_000_000, 2_000_000_000, None);
        assert!((metrics.tokens_per_second - 100.0).abs() < 1e-9);
        assert_eq!(metrics.total_tokens, 100);
    }
}
