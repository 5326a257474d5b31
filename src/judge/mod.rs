//! Conflict Judge (§4.4): focused LLM adjudication of a single claim pair.
//!
//! One call per `CandidatePair`, batched at `judge_batch` concurrency,
//! reusing [`BatchExecutor`] exactly as the Claim Extractor does -- the two
//! phases differ only in prompt and response shape.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::graph::GraphCandidate;
use crate::llm::{BatchConfig, BatchExecutor, BatchedQuery, GenerateOptions, LLMClient};
use crate::model::{Claim, Classification, Clause, ClauseFunction, ClauseId, Conflict, Evidence, Severity};
use crate::prompts::conflict_judge_prompt;
use std::collections::HashMap;

const ACCEPTANCE_CONFIDENCE: f64 = 0.85;

/// ClauseFunctions that escalate a TRUE_CONFLICT to at least HIGH severity
/// (§4.6), mirrored from `adjudicator::map_severity`'s `HIGH_SEVERITY_FUNCTIONS`.
const HIGH_SEVERITY_FUNCTIONS: &[ClauseFunction] = &[
    ClauseFunction::GoverningLawJurisdiction,
    ClauseFunction::IndemnityLiability,
    ClauseFunction::Payment,
    ClauseFunction::Termination,
];

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    has_conflict: bool,
    confidence: f64,
    conflict_type: String,
    why: String,
    resolution: String,
    #[serde(default)]
    evidence: Vec<String>,
}

/// Given a `CandidatePair` and its triggering claims, produces a `Conflict`
/// or `None` when the pair fails the acceptance rule.
pub struct ConflictJudge<C: LLMClient> {
    client: Arc<C>,
}

impl<C: LLMClient + 'static> ConflictJudge<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, candidates, claims, clauses, functions, cancellation))]
    pub async fn judge_all(
        &self,
        candidates: &[GraphCandidate],
        claims: &[Claim],
        clauses: &[Clause],
        functions: &HashMap<ClauseId, ClauseFunction>,
        model: &str,
        keep_alive: &str,
        judge_batch: usize,
        cancellation: &CancellationToken,
    ) -> Vec<Conflict> {
        let queries = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, candidate)| {
                let (ia, ib) = candidate.pair.triggering_claims?;
                let claim_a = &claims[ia];
                let claim_b = &claims[ib];
                let override_context = claim_a
                    .is_override
                    .then(|| format!("claim on {} overrides {:?}", claim_a.clause_id, claim_a.overrides_clause))
                    .or_else(|| {
                        claim_b
                            .is_override
                            .then(|| format!("claim on {} overrides {:?}", claim_b.clause_id, claim_b.overrides_clause))
                    });
                Some(BatchedQuery {
                    index: i,
                    prompt: conflict_judge_prompt(
                        &describe_claim(claim_a),
                        &describe_claim(claim_b),
                        override_context.as_deref(),
                    ),
                    options: GenerateOptions::structured(model).with_keep_alive(keep_alive),
                })
            })
            .collect();

        let executor = BatchExecutor::new(
            Arc::clone(&self.client),
            BatchConfig {
                max_parallel: judge_batch.max(1),
                ..BatchConfig::default()
            },
        );
        let results = executor.execute(queries, cancellation).await;

        let clauses_by_id: std::collections::HashMap<&str, &Clause> =
            clauses.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut conflicts = Vec::new();
        for result in results.into_inner() {
            let candidate = &candidates[result.index];
            let raw = match result.outcome {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "conflict judge call failed, pair discarded");
                    continue;
                }
            };
            let parsed: JudgeResponse = match serde_json::from_str(&raw) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "conflict judge response malformed, pair discarded");
                    continue;
                }
            };
            if !parsed.has_conflict || parsed.confidence < ACCEPTANCE_CONFIDENCE {
                continue;
            }
            let Some(left_clause) = clauses_by_id.get(candidate.pair.clause_id_a.as_str()) else { continue };
            let Some(right_clause) = clauses_by_id.get(candidate.pair.clause_id_b.as_str()) else { continue };

            let left_quote = parsed.evidence.first().map(String::as_str).unwrap_or_default();
            let right_quote = parsed.evidence.get(1).map(String::as_str).unwrap_or_default();
            let Some(left_evidence) = Evidence::locate(&left_clause.text, left_quote) else { continue };
            let Some(right_evidence) = Evidence::locate(&right_clause.text, right_quote) else { continue };

            let function_a = functions.get(&candidate.pair.clause_id_a).copied();
            let function_b = functions.get(&candidate.pair.clause_id_b).copied();
            let severity = Severity::parse_lenient(&severity_hint(&parsed.conflict_type, function_a, function_b));
            conflicts.push(Conflict {
                id: Uuid::new_v4().to_string(),
                left_clause_id: candidate.pair.clause_id_a.clone(),
                right_clause_id: candidate.pair.clause_id_b.clone(),
                classification: Classification::TrueConflict,
                conflict_type: parsed.conflict_type,
                severity,
                confidence: parsed.confidence,
                materiality: severity,
                summary: parsed.why,
                explanation: parsed.resolution,
                left_evidence,
                right_evidence,
            });
        }
        conflicts
    }
}

fn describe_claim(claim: &Claim) -> String {
    format!(
        "subject={} action={} modality={:?} value_type={:?} normalized_value={} source_quote={}",
        claim.subject, claim.action, claim.modality, claim.value_type, claim.normalized_value, claim.source_quote
    )
}

/// Severity mapping (§4.6): jurisdiction conflicts are always CRITICAL;
/// a TRUE_CONFLICT touching a high-severity ClauseFunction is at least HIGH;
/// otherwise MEDIUM.
fn severity_hint(
    conflict_type: &str,
    function_a: Option<ClauseFunction>,
    function_b: Option<ClauseFunction>,
) -> String {
    if conflict_type.to_ascii_lowercase().contains("jurisdiction") {
        return "CRITICAL".to_string();
    }
    let touches_high_function = [function_a, function_b]
        .into_iter()
        .flatten()
        .any(|f| HIGH_SEVERITY_FUNCTIONS.contains(&f));
    if touches_high_function {
        "HIGH".to_string()
    } else {
        "MEDIUM".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_hint_escalates_jurisdiction() {
        assert_eq!(severity_hint("JurisdictionMismatch", None, None), "CRITICAL");
        assert_eq!(severity_hint("ValueMismatch", None, None), "MEDIUM");
    }

    #[test]
    fn severity_hint_escalates_high_severity_function() {
        assert_eq!(
            severity_hint("ValueMismatch", Some(ClauseFunction::Payment), None),
            "HIGH"
        );
        assert_eq!(
            severity_hint("ValueMismatch", Some(ClauseFunction::Definitions), None),
            "MEDIUM"
        );
    }
}
