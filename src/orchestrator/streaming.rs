//! Streaming adapters (§6): interactive 1↔1, 1↔N, and N↔N clause comparison
//! as SSE-shaped event streams, for a consumer's interactive UI rather than a
//! batch run.
//!
//! Each adapter drives an internal `tokio::sync::mpsc` channel from a spawned
//! task and exposes the receiver as a `Stream`, the same "owns its payload,
//! suspends on I/O" shape the teacher's `StreamRuntime::generate` token loop
//! uses, generalized from a single token consumption loop to a sequence of
//! whole-pair LLM calls.

use futures::stream::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::llm::{GenerateOptions, LLMClient, PerformanceMetrics};
use crate::model::Clause;
use crate::prompts::self_check_prompt;

const CHANNEL_CAPACITY: usize = 32;

/// One SSE event, serialized exactly to the schema in §6.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum SseEvent {
    Status { message: String, total: usize },
    Result { data: PairResult },
    Complete { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PairResult {
    pub clause_i_index: usize,
    pub clause_j_index: usize,
    pub is_self_check: bool,
    pub conflict: bool,
    pub severity: String,
    pub explanation: String,
    pub performance: PerformanceMetrics,
}

impl SseEvent {
    /// `data: <json>\n\n` framing. Malformed serialization is not a
    /// reachable failure mode for this type, so it falls back to an empty
    /// frame rather than panicking.
    pub fn to_wire(&self) -> String {
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("data: {body}\n\n")
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = SseEvent> + Send>>;

#[derive(Debug, serde::Deserialize)]
struct PairCheckResponse {
    has_conflict: bool,
    confidence: f64,
    #[serde(default)]
    conflict_type: String,
    #[serde(default)]
    why: String,
}

/// Sends `event`, applying backpressure rather than dropping it (§6
/// "buffering disabled"). Returns `false` once the receiver is gone, so the
/// caller can stop issuing further LLM calls instead of running them to
/// completion with nowhere for the results to go.
async fn send_or_stop(tx: &mpsc::Sender<SseEvent>, event: SseEvent) -> bool {
    tx.send(event).await.is_ok()
}

async fn run_pair_check<C: LLMClient>(
    client: &C,
    model: &str,
    keep_alive: &str,
    prompt: String,
) -> (bool, String, String, PerformanceMetrics) {
    let opts = GenerateOptions::structured(model).with_keep_alive(keep_alive);
    match client.generate(&prompt, &opts).await {
        Ok((raw, performance)) => match serde_json::from_str::<PairCheckResponse>(&raw) {
            Ok(parsed) => {
                let severity = if parsed.conflict_type.to_ascii_lowercase().contains("jurisdiction") {
                    "CRITICAL"
                } else if parsed.confidence >= 0.85 {
                    "HIGH"
                } else {
                    "MEDIUM"
                };
                (parsed.has_conflict, severity.to_string(), parsed.why, performance)
            }
            Err(e) => (false, "LOW".to_string(), format!("malformed response: {e}"), performance),
        },
        Err(e) => (false, "LOW".to_string(), format!("llm call failed: {e}"), PerformanceMetrics::default()),
    }
}

/// 1↔1 interactive comparison: a single pair, one `status`, one `result`,
/// one `complete`.
pub fn stream_pair_compare<C: LLMClient + 'static>(
    client: Arc<C>,
    model: String,
    keep_alive: String,
    clause_a: Clause,
    clause_b: Clause,
    prompt: impl Fn(&Clause, &Clause) -> String + Send + 'static,
) -> SseStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        if !send_or_stop(&tx, SseEvent::Status { message: "comparing clause pair".into(), total: 1 }).await {
            return;
        }
        let query = prompt(&clause_a, &clause_b);
        let (conflict, severity, explanation, performance) =
            run_pair_check(client.as_ref(), &model, &keep_alive, query).await;
        if !send_or_stop(
            &tx,
            SseEvent::Result {
                data: PairResult {
                    clause_i_index: clause_a.order_index as usize,
                    clause_j_index: clause_b.order_index as usize,
                    is_self_check: false,
                    conflict,
                    severity,
                    explanation,
                    performance,
                },
            },
        )
        .await
        {
            return;
        }
        send_or_stop(&tx, SseEvent::Complete { message: "done".into() }).await;
    });
    Box::pin(ReceiverStream::new(rx))
}

/// 1↔N: one reference clause compared sequentially against each target, in
/// target order.
pub fn stream_one_to_n<C: LLMClient + 'static>(
    client: Arc<C>,
    model: String,
    keep_alive: String,
    ref_clause: Clause,
    target_clauses: Vec<Clause>,
    prompt: impl Fn(&Clause, &Clause) -> String + Send + Sync + 'static,
) -> SseStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let total = target_clauses.len();
    tokio::spawn(async move {
        if !send_or_stop(&tx, SseEvent::Status { message: "comparing against targets".into(), total }).await {
            return;
        }
        for target in &target_clauses {
            let query = prompt(&ref_clause, target);
            let (conflict, severity, explanation, performance) =
                run_pair_check(client.as_ref(), &model, &keep_alive, query).await;
            if !send_or_stop(
                &tx,
                SseEvent::Result {
                    data: PairResult {
                        clause_i_index: ref_clause.order_index as usize,
                        clause_j_index: target.order_index as usize,
                        is_self_check: false,
                        conflict,
                        severity,
                        explanation,
                        performance,
                    },
                },
            )
            .await
            {
                return;
            }
        }
        send_or_stop(&tx, SseEvent::Complete { message: "done".into() }).await;
    });
    Box::pin(ReceiverStream::new(rx))
}

/// N↔N: every clause self-checked first in clause order, then every
/// ascending `(i, j)` pair in `clauses` order. Self-checks surface internal
/// contradictions that a pairwise scan alone would never compare against.
pub fn stream_all_vs_all<C: LLMClient + 'static>(
    client: Arc<C>,
    model: String,
    keep_alive: String,
    clauses: Vec<Clause>,
    pair_prompt: impl Fn(&Clause, &Clause) -> String + Send + Sync + 'static,
) -> SseStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let n = clauses.len();
    let total = n + n.saturating_sub(1) * n / 2;
    tokio::spawn(async move {
        if !send_or_stop(&tx, SseEvent::Status { message: "running self-checks and pairwise comparison".into(), total })
            .await
        {
            return;
        }

        for clause in &clauses {
            let query = self_check_prompt(clause);
            let (conflict, severity, explanation, performance) =
                run_pair_check(client.as_ref(), &model, &keep_alive, query).await;
            if !send_or_stop(
                &tx,
                SseEvent::Result {
                    data: PairResult {
                        clause_i_index: clause.order_index as usize,
                        clause_j_index: clause.order_index as usize,
                        is_self_check: true,
                        conflict,
                        severity,
                        explanation,
                        performance,
                    },
                },
            )
            .await
            {
                return;
            }
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let query = pair_prompt(&clauses[i], &clauses[j]);
                let (conflict, severity, explanation, performance) =
                    run_pair_check(client.as_ref(), &model, &keep_alive, query).await;
                if !send_or_stop(
                    &tx,
                    SseEvent::Result {
                        data: PairResult {
                            clause_i_index: clauses[i].order_index as usize,
                            clause_j_index: clauses[j].order_index as usize,
                            is_self_check: false,
                            conflict,
                            severity,
                            explanation,
                            performance,
                        },
                    },
                )
                .await
                {
                    return;
                }
            }
        }

        send_or_stop(&tx, SseEvent::Complete { message: "done".into() }).await;
    });
    Box::pin(ReceiverStream::new(rx))
}
