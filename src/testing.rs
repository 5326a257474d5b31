//! Test-only fixtures and a scripted `LLMClient` mock, feature-gated behind
//! `#[cfg(any(test, feature = "testing"))]` so downstream crates can reuse
//! them for their own integration tests the way the teacher's
//! `FlakyBatchClient`/`MockValidator` mocks are shared across test modules.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::llm::{BoxStream, GenerateOptions, LLMClient, PerformanceMetrics, StreamEvent};
use crate::model::{Clause, Claim, Modality, Topic, ValueType};

pub fn fixture_clause(id: &str, order_index: u32, text: &str) -> Clause {
    Clause::new(id, order_index, text)
}

pub fn fixture_claim(clause_id: &str, subject: &str, modality: Modality) -> Claim {
    Claim {
        clause_id: clause_id.to_string(),
        subject: subject.to_string(),
        action: "be made".to_string(),
        modality,
        object: None,
        value_type: ValueType::None,
        normalized_value: String::new(),
        original_value: String::new(),
        conditions: Vec::new(),
        exceptions: Vec::new(),
        source_quote: "quote".to_string(),
        topic: Topic::General,
        is_override: false,
        overrides_clause: None,
    }
}

/// One scripted response for [`MockLlmClient`]: a successful body or an
/// error, consumed in FIFO order regardless of which clause/pair triggered
/// the call.
pub enum ScriptedResponse {
    Ok(String),
    Err(Error),
}

/// Deterministic, scripted [`LLMClient`] for pipeline tests, grounded on the
/// teacher's `FlakyBatchClient` (a `Mutex`-guarded response queue consumed
/// by `generate`/`stream`, so concurrent batch calls still observe a
/// well-defined order).
pub struct MockLlmClient {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    repeat_last: bool,
}

impl MockLlmClient {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            repeat_last: false,
        }
    }

    /// Every call returns the same JSON body, forever.
    pub fn constant(body: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([ScriptedResponse::Ok(body.into())])),
            repeat_last: true,
        }
    }

    fn next_response(&self) -> ScriptedResponse {
        let mut queue = self.responses.lock().expect("mock response queue poisoned");
        if self.repeat_last {
            return match queue.front() {
                Some(ScriptedResponse::Ok(body)) => ScriptedResponse::Ok(body.clone()),
                Some(ScriptedResponse::Err(_)) | None => {
                    ScriptedResponse::Err(Error::internal("mock client exhausted its scripted responses"))
                }
            };
        }
        queue
            .pop_front()
            .unwrap_or_else(|| ScriptedResponse::Err(Error::internal("mock client exhausted its scripted responses")))
    }
}

#[async_trait]
impl LLMClient for MockLlmClient {
    async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> Result<(String, PerformanceMetrics)> {
        match self.next_response() {
            ScriptedResponse::Ok(body) => Ok((body, PerformanceMetrics::default())),
            ScriptedResponse::Err(err) => Err(err),
        }
    }

    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<BoxStream> {
        let (text, performance) = self.generate(prompt, opts).await?;
        Ok(Box::pin(futures::stream::iter(vec![
            StreamEvent::Token { content: text },
            StreamEvent::Complete { performance },
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constant_mock_repeats_the_same_body() {
        let client = MockLlmClient::constant("{}");
        let opts = GenerateOptions::structured("m");
        let (a, _) = client.generate("p", &opts).await.unwrap();
        let (b, _) = client.generate("p", &opts).await.unwrap();
        assert_eq!(a, "{}");
        assert_eq!(b, "{}");
    }

    #[tokio::test]
    async fn scripted_queue_is_consumed_in_order() {
        let client = MockLlmClient::new(vec![
            ScriptedResponse::Ok("first".into()),
            ScriptedResponse::Ok("second".into()),
        ]);
        let opts = GenerateOptions::structured("m");
        let (a, _) = client.generate("p", &opts).await.unwrap();
        let (b, _) = client.generate("p", &opts).await.unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "second");
    }

    #[tokio::test]
    async fn exhausted_queue_yields_internal_error() {
        let client = MockLlmClient::new(vec![ScriptedResponse::Ok("only".into())]);
        let opts = GenerateOptions::structured("m");
        let _ = client.generate("p", &opts).await.unwrap();
        assert!(client.generate("p", &opts).await.is_err());
    }
}
