//! Pair Adjudicator (§4.6): batched LLM classification of clause pairs into
//! the six-valued taxonomy, with evidence validation, optional
//! self-consistency voting, and an optional verification pass.
//!
//! State machine per pair (NEW -> CLASSIFIED -> CANDIDATE -> AGREED ->
//! VERIFIED -> EMITTED, any step may fall to DISCARDED) is modeled as a
//! sequence of filters rather than an explicit state enum: each stage
//! either carries a verdict forward or drops it, which is the same shape
//! the teacher's `ValidationIteration` pipeline in `adversarial/types.rs`
//! uses for its own iterate-then-filter validation loop.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::llm::{BatchConfig, BatchExecutor, BatchedQuery, GenerateOptions, LLMClient};
use crate::model::{CandidatePair, Classification, Clause, ClauseFunction, ClauseId, Conflict, Evidence, Severity};
use crate::prompts::{pair_adjudicator_prompt, verification_prompt, PairPayload};

const UNWRAP_KEYS: &[&str] = &["conflicts", "results", "data", "conflict_list"];

/// Accepts either a bare JSON array or an object wrapping one under a
/// recognized key (§9 open question 3).
pub fn unwrap_json_array(value: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(arr) = value {
        return Some(arr);
    }
    let obj = value.as_object()?;
    for key in UNWRAP_KEYS {
        if let Some(Value::Array(arr)) = obj.get(*key) {
            return Some(arr);
        }
    }
    None
}

#[derive(Debug, Deserialize, Clone)]
struct RawEvidence {
    quote: String,
    #[serde(default)]
    #[allow(dead_code)]
    start_char: usize,
    #[serde(default)]
    #[allow(dead_code)]
    end_char: usize,
}

#[derive(Debug, Deserialize, Clone)]
struct RawVerdict {
    pair_index: usize,
    classification: String,
    confidence: f64,
    conflict_type: String,
    summary: String,
    left_evidence: RawEvidence,
    right_evidence: RawEvidence,
    materiality: String,
}

/// A verdict that has passed classification + the storage filter, carrying
/// everything needed for the consistency/verification stages.
#[derive(Clone)]
struct CandidateVerdict {
    pair: CandidatePair,
    classification: Classification,
    confidence: f64,
    conflict_type: String,
    summary: String,
    materiality: Severity,
    left_evidence: Evidence,
    right_evidence: Evidence,
}

pub struct AdjudicatorOptions<'a> {
    pub model: &'a str,
    pub keep_alive: &'a str,
    pub pair_batch: usize,
    pub batch_concurrency: usize,
    pub consistency_votes: usize,
    pub verification_enabled: bool,
    pub verification_confidence: f64,
    pub confidence_threshold: f64,
}

pub struct PairAdjudicator<C: LLMClient> {
    client: Arc<C>,
}

impl<C: LLMClient + 'static> PairAdjudicator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, candidates, clauses, functions, opts, cancellation))]
    pub async fn adjudicate(
        &self,
        candidates: &[CandidatePair],
        clauses: &[Clause],
        functions: &HashMap<ClauseId, ClauseFunction>,
        opts: &AdjudicatorOptions<'_>,
        cancellation: &CancellationToken,
    ) -> Vec<Conflict> {
        let clauses_by_id: HashMap<&str, &Clause> = clauses.iter().map(|c| (c.id.as_str(), c)).collect();

        let classified = self
            .classify_batches(candidates, &clauses_by_id, functions, opts, cancellation)
            .await;

        let storage_filtered: Vec<CandidateVerdict> = classified
            .into_iter()
            .filter(|v| v.classification.is_emittable() && v.confidence >= opts.confidence_threshold)
            .collect();

        let agreed = if opts.consistency_votes > 1 {
            self.consistency_vote(storage_filtered, &clauses_by_id, functions, opts, cancellation)
                .await
        } else {
            storage_filtered
        };

        let verified = if opts.verification_enabled {
            self.verify(agreed, &clauses_by_id, opts, cancellation).await
        } else {
            agreed
        };

        verified
            .into_iter()
            .map(|v| self.finalize(v, functions))
            .collect()
    }

    async fn classify_batches(
        &self,
        candidates: &[CandidatePair],
        clauses_by_id: &HashMap<&str, &Clause>,
        functions: &HashMap<ClauseId, ClauseFunction>,
        opts: &AdjudicatorOptions<'_>,
        cancellation: &CancellationToken,
    ) -> Vec<CandidateVerdict> {
        let chunks: Vec<&[CandidatePair]> = candidates.chunks(opts.pair_batch.max(1)).collect();

        let function_name = |id: &str| -> String {
            functions
                .get(id)
                .map(|f| format!("{f:?}"))
                .unwrap_or_else(|| "Unknown".to_string())
        };

        let mut prompts = Vec::with_capacity(chunks.len());
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let mut names = Vec::with_capacity(chunk.len() * 2);
            let mut payload_refs = Vec::with_capacity(chunk.len());
            for pair in chunk.iter() {
                let (Some(clause_a), Some(clause_b)) = (
                    clauses_by_id.get(pair.clause_id_a.as_str()),
                    clauses_by_id.get(pair.clause_id_b.as_str()),
                ) else {
                    continue;
                };
                names.push(function_name(&pair.clause_id_a));
                names.push(function_name(&pair.clause_id_b));
                payload_refs.push((clause_a, clause_b));
            }
            if payload_refs.is_empty() {
                continue;
            }
            let payloads: Vec<PairPayload<'_>> = payload_refs
                .iter()
                .enumerate()
                .map(|(i, (clause_a, clause_b))| PairPayload {
                    pair_index: i,
                    clause_a,
                    clause_b,
                    function_a: &names[i * 2],
                    function_b: &names[i * 2 + 1],
                })
                .collect();
            prompts.push((chunk_index, pair_adjudicator_prompt(None, &payloads)));
        }

        let queries = prompts
            .into_iter()
            .map(|(chunk_index, prompt)| BatchedQuery {
                index: chunk_index,
                prompt,
                options: GenerateOptions::structured(opts.model).with_keep_alive(opts.keep_alive),
            })
            .collect();

        let executor = BatchExecutor::new(
            Arc::clone(&self.client),
            BatchConfig {
                max_parallel: opts.batch_concurrency.max(1),
                ..BatchConfig::default()
            },
        );
        let results = executor.execute(queries, cancellation).await;

        let mut out = Vec::new();
        for result in results.into_inner() {
            let chunk = chunks[result.index];
            let raw = match result.outcome {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "pair adjudicator batch call failed, chunk discarded");
                    continue;
                }
            };
            let value: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "pair adjudicator response was not valid JSON");
                    continue;
                }
            };
            let Some(entries) = unwrap_json_array(&value) else {
                warn!("pair adjudicator response had no recognizable array");
                continue;
            };
            for entry in entries {
                let Ok(raw_verdict) = serde_json::from_value::<RawVerdict>(entry.clone()) else {
                    continue;
                };
                let Some(pair) = chunk.get(raw_verdict.pair_index) else { continue };
                let Some(clause_a) = clauses_by_id.get(pair.clause_id_a.as_str()) else { continue };
                let Some(clause_b) = clauses_by_id.get(pair.clause_id_b.as_str()) else { continue };
                let Some(classification) = Classification::parse_lenient(&raw_verdict.classification) else {
                    continue;
                };

                let (classification, left_evidence, right_evidence) =
                    match (Evidence::locate(&clause_a.text, &raw_verdict.left_evidence.quote),
                           Evidence::locate(&clause_b.text, &raw_verdict.right_evidence.quote))
                    {
                        (Some(l), Some(r)) => (classification, l, r),
                        _ if classification == Classification::Ambiguity => continue,
                        _ => (Classification::Ambiguity,
                              Evidence::locate(&clause_a.text, &raw_verdict.left_evidence.quote)
                                  .unwrap_or(Evidence { quote: String::new(), start_char: 0, end_char: 0 }),
                              Evidence::locate(&clause_b.text, &raw_verdict.right_evidence.quote)
                                  .unwrap_or(Evidence { quote: String::new(), start_char: 0, end_char: 0 })),
                    };
                if left_evidence.quote.is_empty() || right_evidence.quote.is_empty() {
                    continue;
                }

                out.push(CandidateVerdict {
                    pair: pair.clone(),
                    classification,
                    confidence: raw_verdict.confidence,
                    conflict_type: raw_verdict.conflict_type,
                    summary: raw_verdict.summary,
                    materiality: Severity::parse_lenient(&raw_verdict.materiality),
                    left_evidence,
                    right_evidence,
                });
            }
        }
        out
    }

    async fn consistency_vote(
        &self,
        candidates: Vec<CandidateVerdict>,
        clauses_by_id: &HashMap<&str, &Clause>,
        functions: &HashMap<ClauseId, ClauseFunction>,
        opts: &AdjudicatorOptions<'_>,
        cancellation: &CancellationToken,
    ) -> Vec<CandidateVerdict> {
        let majority_needed = opts.consistency_votes.div_ceil(2);
        let mut survivors = Vec::new();

        for verdict in candidates {
            let Some(clause_a) = clauses_by_id.get(verdict.pair.clause_id_a.as_str()) else { continue };
            let Some(clause_b) = clauses_by_id.get(verdict.pair.clause_id_b.as_str()) else { continue };
            let function_a = functions
                .get(&verdict.pair.clause_id_a)
                .map(|f| format!("{f:?}"))
                .unwrap_or_else(|| "Unknown".to_string());
            let function_b = functions
                .get(&verdict.pair.clause_id_b)
                .map(|f| format!("{f:?}"))
                .unwrap_or_else(|| "Unknown".to_string());

            let mut agree_count = 1;
            let mut confidences = vec![verdict.confidence];

            let extra_votes = opts.consistency_votes.saturating_sub(1);
            let queries = (0..extra_votes)
                .map(|vote_index| BatchedQuery {
                    index: vote_index,
                    prompt: pair_adjudicator_prompt(
                        Some(&format!("independent re-check #{vote_index}")),
                        &[PairPayload {
                            pair_index: 0,
                            clause_a,
                            clause_b,
                            function_a: &function_a,
                            function_b: &function_b,
                        }],
                    ),
                    options: GenerateOptions::structured(opts.model).with_keep_alive(opts.keep_alive),
                })
                .collect();

            let executor = BatchExecutor::new(
                Arc::clone(&self.client),
                BatchConfig { max_parallel: opts.batch_concurrency.max(1), ..BatchConfig::default() },
            );
            let results = executor.execute(queries, cancellation).await;

            for result in results.into_inner() {
                let Ok(text) = result.outcome else { continue };
                let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
                let Some(entries) = unwrap_json_array(&value) else { continue };
                let Some(entry) = entries.first() else { continue };
                let Ok(raw) = serde_json::from_value::<RawVerdict>(entry.clone()) else { continue };
                let Some(classification) = Classification::parse_lenient(&raw.classification) else { continue };
                if classification.is_emittable() {
                    agree_count += 1;
                    confidences.push(raw.confidence);
                }
            }

            if agree_count >= majority_needed {
                let mean_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
                survivors.push(CandidateVerdict { confidence: mean_confidence, ..verdict });
            }
        }
        survivors
    }

    async fn verify(
        &self,
        candidates: Vec<CandidateVerdict>,
        clauses_by_id: &HashMap<&str, &Clause>,
        opts: &AdjudicatorOptions<'_>,
        cancellation: &CancellationToken,
    ) -> Vec<CandidateVerdict> {
        let mut indexable = Vec::new();
        let queries = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, verdict)| {
                let clause_a = clauses_by_id.get(verdict.pair.clause_id_a.as_str())?;
                let clause_b = clauses_by_id.get(verdict.pair.clause_id_b.as_str())?;
                indexable.push(i);
                Some(BatchedQuery {
                    index: i,
                    prompt: verification_prompt(
                        clause_a,
                        clause_b,
                        &verdict.left_evidence.quote,
                        &verdict.right_evidence.quote,
                        &format!("{:?}", verdict.classification),
                    ),
                    options: GenerateOptions::structured(opts.model).with_keep_alive(opts.keep_alive),
                })
            })
            .collect();

        let executor = BatchExecutor::new(
            Arc::clone(&self.client),
            BatchConfig { max_parallel: opts.batch_concurrency.max(1), ..BatchConfig::default() },
        );
        let results = executor.execute(queries, cancellation).await;

        #[derive(Deserialize)]
        struct VerificationResponse {
            has_conflict: bool,
            confidence: f64,
        }

        let mut verified = Vec::new();
        for result in results.into_inner() {
            let Ok(text) = result.outcome else { continue };
            let Ok(resp) = serde_json::from_str::<VerificationResponse>(&text) else { continue };
            if resp.has_conflict && resp.confidence >= opts.verification_confidence {
                verified.push(CandidateVerdict { confidence: resp.confidence, ..candidates[result.index].clone() });
            }
        }
        verified
    }

    fn finalize(&self, verdict: CandidateVerdict, functions: &HashMap<ClauseId, ClauseFunction>) -> Conflict {
        let severity = map_severity(&verdict, functions);
        Conflict {
            id: Uuid::new_v4().to_string(),
            left_clause_id: verdict.pair.clause_id_a,
            right_clause_id: verdict.pair.clause_id_b,
            classification: verdict.classification,
            conflict_type: verdict.conflict_type,
            severity,
            confidence: verdict.confidence,
            materiality: verdict.materiality,
            summary: verdict.summary.clone(),
            explanation: verdict.summary,
            left_evidence: verdict.left_evidence,
            right_evidence: verdict.right_evidence,
        }
    }
}

const HIGH_SEVERITY_FUNCTIONS: &[ClauseFunction] = &[
    ClauseFunction::GoverningLawJurisdiction,
    ClauseFunction::IndemnityLiability,
    ClauseFunction::Payment,
    ClauseFunction::Termination,
];

/// Severity mapping (§4.6): start from materiality, then apply upgrades.
fn map_severity(verdict: &CandidateVerdict, functions: &HashMap<ClauseId, ClauseFunction>) -> Severity {
    let mut severity = verdict.materiality;

    if verdict.conflict_type.to_ascii_lowercase().contains("jurisdictionmismatch")
        || verdict.conflict_type.to_ascii_lowercase() == "jurisdiction mismatch"
    {
        return Severity::Critical;
    }

    if verdict.classification == Classification::TrueConflict {
        let function_a = functions.get(&verdict.pair.clause_id_a).copied();
        let function_b = functions.get(&verdict.pair.clause_id_b).copied();
        let touches_high_function = [function_a, function_b]
            .into_iter()
            .flatten()
            .any(|f| HIGH_SEVERITY_FUNCTIONS.contains(&f));
        if touches_high_function && severity < Severity::High {
            severity = Severity::High;
        }
    }

    if verdict.classification == Classification::Ambiguity {
        severity = Severity::Medium;
    }

    severity
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_bare_array() {
        let value = json!([{"a": 1}]);
        assert_eq!(unwrap_json_array(&value).unwrap().len(), 1);
    }

    #[test]
    fn unwrap_dict_wrapped_under_conflicts_key() {
        let value = json!({"conflicts": [{"a": 1}, {"a": 2}]});
        assert_eq!(unwrap_json_array(&value).unwrap().len(), 2);
    }

    #[test]
    fn unwrap_returns_none_for_unrecognized_shape() {
        let value = json!({"unexpected": [1, 2]});
        assert!(unwrap_json_array(&value).is_none());
    }

    #[test]
    fn severity_mapping_jurisdiction_is_always_critical() {
        let verdict = CandidateVerdict {
            pair: CandidatePair::canonical("a".into(), "b".into(), crate::model::Provenance::Cluster),
            classification: Classification::TrueConflict,
            confidence: 0.9,
            conflict_type: "JurisdictionMismatch".into(),
            summary: "s".into(),
            materiality: Severity::Low,
            left_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
            right_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
        };
        assert_eq!(map_severity(&verdict, &HashMap::new()), Severity::Critical);
    }

    #[test]
    fn severity_mapping_ambiguity_is_always_medium() {
        let verdict = CandidateVerdict {
            pair: CandidatePair::canonical("a".into(), "b".into(), crate::model::Provenance::Cluster),
            classification: Classification::Ambiguity,
            confidence: 0.9,
            conflict_type: "Vague".into(),
            summary: "s".into(),
            materiality: Severity::Critical,
            left_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
            right_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
        };
        assert_eq!(map_severity(&verdict, &HashMap::new()), Severity::Medium);
    }

    #[test]
    fn severity_mapping_upgrades_true_conflict_on_high_severity_function() {
        let pair = CandidatePair::canonical("a".into(), "b".into(), crate::model::Provenance::Cluster);
        let mut functions = HashMap::new();
        functions.insert(pair.clause_id_a.clone(), ClauseFunction::Payment);
        let verdict = CandidateVerdict {
            pair,
            classification: Classification::TrueConflict,
            confidence: 0.9,
            conflict_type: "ValueMismatch".into(),
            summary: "s".into(),
            materiality: Severity::Low,
            left_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
            right_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
        };
        assert_eq!(map_severity(&verdict, &functions), Severity::High);
    }
}
