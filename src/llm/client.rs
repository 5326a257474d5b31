//! LLM client: single abstraction over a remote generation service with both
//! streaming and unary modes (§4.1).
//!
//! Grounded on the teacher's `LLMClient` trait + `AnthropicClient`/
//! `ClientConfig` shape (one trait, one concrete struct per backend, a
//! consuming-builder config), generalized from a REST chat-completions
//! backend to the Ollama-shaped generation endpoint this engine targets, and
//! extended with the `stream()` operation the teacher's client never needed.

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::llm::types::{
    GenerateOptions, OllamaGenerateRequest, OllamaGenerateResponse, OllamaOptions,
    PerformanceMetrics, StreamEvent,
};

pub type BoxStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Single abstraction over a remote generation service. The client is
/// reentrant: multiple concurrent calls are permitted and expected (§4.1
/// concurrency note).
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Blocks until completion, returning the full text and terminal
    /// metrics.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<(String, PerformanceMetrics)>;

    /// Yields `Token` events followed by exactly one `Complete` event;
    /// `Error` may terminate the stream early. The consumer (not the
    /// producer) is responsible for noting the wall-clock instant of the
    /// first `Token` as `time_to_first_token`, since `PerformanceMetrics`
    /// thereon is only known once the server reports the terminal chunk.
    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<BoxStream>;
}

/// Builder for an [`OllamaClient`], mirroring the teacher's `ClientConfig`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Global in-flight-call cap, process-scoped (§9 "global mutable
    /// state"). `None` means unbounded at the client layer; the orchestrator
    /// still applies its own per-phase semaphores.
    pub max_in_flight: Option<usize>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_in_flight: None,
        }
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }
}

/// Builds the underlying `reqwest::Client`. Isolated in its own function (the
/// teacher's `build_http_client` pattern) so a future TLS/proxy
/// configuration change has one call site.
fn build_http_client() -> Client {
    Client::builder()
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for an Ollama-shaped `/api/generate` endpoint.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    in_flight: Option<Arc<Semaphore>>,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: build_http_client(),
            base_url: config.base_url,
            in_flight: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    async fn acquire_permit(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match &self.in_flight {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    fn build_request<'a>(prompt: &'a str, opts: &'a GenerateOptions, stream: bool) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &opts.model,
            prompt,
            stream,
            format: opts.format.as_deref(),
            keep_alive: &opts.keep_alive,
            options: OllamaOptions {
                temperature: opts.temperature,
                top_p: opts.top_p,
            },
        }
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<(String, PerformanceMetrics)> {
        let _permit = self.acquire_permit().await;
        let body = Self::build_request(prompt, opts, false);

        let resp = self
            .http
            .post(self.endpoint())
            .timeout(opts.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Error::llm_transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::llm_transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("LLM endpoint returned HTTP {status}"),
            )));
        }

        let raw = resp.text().await.map_err(Error::llm_transport)?;
        let parsed: OllamaGenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::llm_malformed(e.to_string(), raw.clone()))?;

        let metrics = PerformanceMetrics::from_ollama_counters(
            parsed.eval_count,
            parsed.eval_duration,
            parsed.total_duration,
            None,
        );
        Ok((parsed.response, metrics))
    }

    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<BoxStream> {
        let permit = self.acquire_permit().await;
        let body = Self::build_request(prompt, opts, true);

        let resp = self
            .http
            .post(self.endpoint())
            .timeout(opts.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Error::llm_transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = format!("LLM endpoint returned HTTP {status}");
            return Ok(Box::pin(futures::stream::once(async move {
                StreamEvent::Error { message }
            })));
        }

        let byte_stream = resp.bytes_stream();
        let buf = Vec::new();

        // `permit` (an `OwnedSemaphorePermit`, if any) rides along in the
        // unfold state purely to stay alive for the stream's lifetime. Note
        // to consumers of `time_to_first_token`: it is not populated here --
        // stamp it at the wall-clock instant the first `Token` event is
        // observed, per this method's doc comment.
        let stream = futures::stream::unfold(
            (byte_stream, buf, permit),
            move |(mut byte_stream, mut buf, permit)| async move {
                loop {
                    if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if line.is_empty() {
                            continue;
                        }
                        let parsed: std::result::Result<OllamaGenerateResponse, _> =
                            serde_json::from_slice(line);
                        match parsed {
                            Ok(chunk) if chunk.done => {
                                let metrics = PerformanceMetrics::from_ollama_counters(
                                    chunk.eval_count,
                                    chunk.eval_duration,
                                    chunk.total_duration,
                                    None,
                                );
                                return Some((
                                    StreamEvent::Complete { performance: metrics },
                                    (byte_stream, buf, permit),
                                ));
                            }
                            Ok(chunk) => {
                                return Some((
                                    StreamEvent::Token { content: chunk.response },
                                    (byte_stream, buf, permit),
                                ));
                            }
                            Err(e) => {
                                return Some((
                                    StreamEvent::Error { message: e.to_string() },
                                    (byte_stream, buf, permit),
                                ));
                            }
                        }
                    }

                    match byte_stream.next().await {
                        Some(Ok(bytes)) => {
                            buf.extend_from_slice(&bytes);
                            continue;
                        }
                        Some(Err(e)) => {
                            return Some((
                                StreamEvent::Error { message: e.to_string() },
                                (byte_stream, buf, permit),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OllamaClient::new(ClientConfig::new("http://localhost:11434/"));
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn build_request_carries_format_and_keep_alive() {
        let opts = GenerateOptions::structured("llama3").with_keep_alive("45m");
        let req = OllamaClient::build_request("hello", &opts, true);
        assert_eq!(req.format, Some("json"));
        assert_eq!(req.keep_alive, "45m");
        assert!(req.stream);
    }
}
