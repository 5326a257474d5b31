//! Orchestrator (§4.7): sequences the two pipeline variants and reports
//! phase statistics. Grounded on the teacher's top-level orchestration loop
//! shape (validate input, run phases, always return stats even on partial
//! failure) generalized from RLM recursion control to this engine's
//! two fixed phase sequences.

pub mod streaming;

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::adjudicator::{AdjudicatorOptions, PairAdjudicator};
use crate::candidates::{generate_candidates, clause_function_cached, KeywordTopicClusterer, TopicClusterer};
use crate::claims::ClaimExtractor;
use crate::config::{RunOptions, Strategy, StrategyOptions};
use crate::error::{Error, Result};
use crate::graph::build_candidate_pairs;
use crate::judge::ConflictJudge;
use crate::llm::{ClauseFunctionCache, LLMClient};
use crate::model::{Clause, ClauseFunction, ClauseId, Conflict};
use crate::store::ConflictStore;

/// Per-phase counters and elapsed times reported on every run, successful
/// or not (§4.7, §7 "a run always returns stats").
#[derive(Debug, Clone, Default)]
pub struct PhaseStats {
    pub clauses_considered: usize,
    pub claims_extracted: usize,
    pub candidates_generated: usize,
    pub candidates_filtered_by_compatibility: usize,
    pub conflicts_emitted: usize,
    pub elapsed_per_phase: HashMap<String, Duration>,
    pub fatal_errors: Vec<String>,
}

pub struct RunResult {
    pub conflicts: Vec<Conflict>,
    pub stats: PhaseStats,
}

/// Content-addressed identifier for a clause set, used for the idempotent
/// cache lookup. Pure function of `(id, text)` pairs sorted by id, so
/// reordering the input clause set does not change the version id.
pub fn clause_set_version_id(clauses: &[Clause]) -> String {
    let mut pairs: Vec<(&str, &str)> = clauses.iter().map(|c| (c.id.as_str(), c.text.as_str())).collect();
    pairs.sort_unstable();
    let mut hasher = Sha256::new();
    for (id, text) in pairs {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn validate_clauses(clauses: &[Clause]) -> Result<()> {
    if clauses.is_empty() {
        return Err(Error::invalid_input("clause set is empty"));
    }
    let mut seen = std::collections::HashSet::with_capacity(clauses.len());
    for clause in clauses {
        if clause.text.trim().is_empty() {
            return Err(Error::invalid_input(format!("clause {} has empty text", clause.id)));
        }
        if !seen.insert(clause.id.as_str()) {
            return Err(Error::invalid_input(format!("duplicate clause id: {}", clause.id)));
        }
    }
    Ok(())
}

pub struct Orchestrator<C: LLMClient> {
    client: Arc<C>,
    store: Arc<dyn ConflictStore>,
    function_cache: Arc<ClauseFunctionCache>,
    clusterer: Arc<dyn TopicClusterer>,
}

impl<C: LLMClient + 'static> Orchestrator<C> {
    pub fn new(client: Arc<C>, store: Arc<dyn ConflictStore>) -> Self {
        Self {
            client,
            store,
            function_cache: Arc::new(ClauseFunctionCache::new()),
            clusterer: Arc::new(KeywordTopicClusterer),
        }
    }

    #[instrument(skip(self, clauses, options), fields(clause_count = clauses.len()))]
    pub async fn run_conflict_detection(&self, clauses: &[Clause], options: &RunOptions) -> Result<RunResult> {
        let mut stats = PhaseStats {
            clauses_considered: clauses.len(),
            ..Default::default()
        };

        if let Err(err) = validate_clauses(clauses) {
            stats.fatal_errors.push(err.to_string());
            return Err(err);
        }

        let version_id = clause_set_version_id(clauses);
        let cached = self
            .store
            .lookup_cached_conflicts(&version_id, options.confidence_threshold)
            .await;
        if !cached.is_empty() {
            info!(run = %version_id, count = cached.len(), "idempotent cache hit, skipping LLM");
            stats.conflicts_emitted = cached.len();
            return Ok(RunResult { conflicts: cached, stats });
        }

        let conflicts = {
            let pipeline_future = self.execute_pipeline(clauses, options, &mut stats);
            tokio::pin!(pipeline_future);

            if let Some(timeout) = options.run_timeout {
                tokio::select! {
                    result = &mut pipeline_future => result,
                    _ = options.cancellation_token.cancelled() => Err(Error::Cancelled),
                    _ = tokio::time::sleep(timeout) => Err(Error::internal("run exceeded run_timeout")),
                }
            } else {
                tokio::select! {
                    result = &mut pipeline_future => result,
                    _ = options.cancellation_token.cancelled() => Err(Error::Cancelled),
                }
            }
        };

        match conflicts {
            Ok(conflicts) => {
                stats.conflicts_emitted = conflicts.len();
                self.store.save_conflicts(&conflicts, &version_id).await;
                Ok(RunResult { conflicts, stats })
            }
            Err(Error::Cancelled) => Ok(RunResult { conflicts: Vec::new(), stats }),
            Err(err) => {
                stats.fatal_errors.push(err.to_string());
                Err(err)
            }
        }
    }

    async fn execute_pipeline(
        &self,
        clauses: &[Clause],
        options: &RunOptions,
        stats: &mut PhaseStats,
    ) -> Result<Vec<Conflict>> {
        match options.strategy {
            Strategy::ClaimBased => self.run_claim_based(clauses, options, stats).await,
            Strategy::Hybrid | Strategy::Accurate => self.run_hybrid(clauses, options, stats).await,
        }
    }

    async fn run_claim_based(
        &self,
        clauses: &[Clause],
        options: &RunOptions,
        stats: &mut PhaseStats,
    ) -> Result<Vec<Conflict>> {
        let StrategyOptions::ClaimBased { claim_batch, judge_batch } = options.strategy_options else {
            return Err(Error::config("claim-based strategy requires ClaimBased strategy options"));
        };

        let extractor = ClaimExtractor::new(Arc::clone(&self.client));
        let phase_start = Instant::now();
        let claims = extractor
            .extract_all(clauses, &options.model, &options.keep_alive, claim_batch, &options.cancellation_token)
            .await;
        stats.elapsed_per_phase.insert("claim_extraction".into(), phase_start.elapsed());
        stats.claims_extracted = claims.len();

        let phase_start = Instant::now();
        let candidates = build_candidate_pairs(&claims, clauses);
        stats.elapsed_per_phase.insert("conflict_graph".into(), phase_start.elapsed());
        stats.candidates_generated = candidates.len();

        let mut functions: HashMap<ClauseId, ClauseFunction> = HashMap::with_capacity(clauses.len());
        for clause in clauses {
            functions.insert(clause.id.clone(), clause_function_cached(clause, &self.function_cache).await);
        }

        let judge = ConflictJudge::new(Arc::clone(&self.client));
        let phase_start = Instant::now();
        let conflicts = judge
            .judge_all(
                &candidates,
                &claims,
                clauses,
                &functions,
                &options.model,
                &options.keep_alive,
                judge_batch,
                &options.cancellation_token,
            )
            .await;
        stats.elapsed_per_phase.insert("conflict_judge".into(), phase_start.elapsed());

        Ok(conflicts)
    }

    async fn run_hybrid(
        &self,
        clauses: &[Clause],
        options: &RunOptions,
        stats: &mut PhaseStats,
    ) -> Result<Vec<Conflict>> {
        let (adjudicator_pair_batch, adjudicator_concurrency, consistency_votes, verification_enabled, verification_confidence) =
            match options.strategy_options {
                StrategyOptions::Hybrid { adjudicator_pair_batch, adjudicator_concurrency } => {
                    (adjudicator_pair_batch, adjudicator_concurrency, 1, false, options.confidence_threshold)
                }
                StrategyOptions::Accurate {
                    adjudicator_pair_batch,
                    adjudicator_concurrency,
                    consistency_votes,
                    verification_enabled,
                    verification_confidence,
                } => (
                    adjudicator_pair_batch,
                    adjudicator_concurrency,
                    consistency_votes,
                    verification_enabled,
                    verification_confidence,
                ),
                StrategyOptions::ClaimBased { .. } => {
                    return Err(Error::config("hybrid pipeline requires Hybrid or Accurate strategy options"))
                }
            };

        let mut functions: HashMap<ClauseId, ClauseFunction> = HashMap::with_capacity(clauses.len());
        for clause in clauses {
            functions.insert(clause.id.clone(), clause_function_cached(clause, &self.function_cache).await);
        }

        let phase_start = Instant::now();
        let (candidates, generation_stats) =
            generate_candidates(clauses, self.clusterer.as_ref(), &self.function_cache).await;
        stats.elapsed_per_phase.insert("candidate_generation".into(), phase_start.elapsed());
        stats.candidates_generated = generation_stats.total_after_gate;
        stats.candidates_filtered_by_compatibility =
            generation_stats.total_before_gate.saturating_sub(generation_stats.total_after_gate);

        let adjudicator = PairAdjudicator::new(Arc::clone(&self.client));
        let adjudicator_options = AdjudicatorOptions {
            model: &options.model,
            keep_alive: &options.keep_alive,
            pair_batch: adjudicator_pair_batch,
            batch_concurrency: adjudicator_concurrency,
            consistency_votes,
            verification_enabled,
            verification_confidence,
            confidence_threshold: options.confidence_threshold,
        };
        let phase_start = Instant::now();
        let conflicts = adjudicator
            .adjudicate(&candidates, clauses, &functions, &adjudicator_options, &options.cancellation_token)
            .await;
        stats.elapsed_per_phase.insert("pair_adjudication".into(), phase_start.elapsed());

        if conflicts.is_empty() && !candidates.is_empty() {
            warn!("hybrid pipeline produced no conflicts from a non-empty candidate set");
        }
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Classification, Severity};
    use crate::store::InMemoryConflictStore;
    use crate::testing::{MockLlmClient, ScriptedResponse};

    #[test]
    fn version_id_is_stable_under_reordering() {
        let a = vec![Clause::new("c1", 0, "text a"), Clause::new("c2", 1, "text b")];
        let b = vec![Clause::new("c2", 1, "text b"), Clause::new("c1", 0, "text a")];
        assert_eq!(clause_set_version_id(&a), clause_set_version_id(&b));
    }

    #[test]
    fn validate_rejects_empty_clause_set() {
        assert!(validate_clauses(&[]).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let clauses = vec![Clause::new("c1", 0, "text a"), Clause::new("c1", 1, "text b")];
        assert!(validate_clauses(&clauses).is_err());
    }

    #[test]
    fn validate_rejects_empty_text() {
        let clauses = vec![Clause::new("c1", 0, "   ")];
        assert!(validate_clauses(&clauses).is_err());
    }

    fn claim_based_options() -> RunOptions {
        RunOptions::new(Strategy::ClaimBased, "test-model")
            .with_strategy_options(StrategyOptions::ClaimBased { claim_batch: 1, judge_batch: 1 })
    }

    #[tokio::test]
    async fn scenario_s1_payment_value_mismatch_is_high_severity() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment shall be made within 30 days of invoice.").with_number("3.1"),
            Clause::new("c2", 1, "The Company must pay within 60 days.").with_number("9.5"),
        ];
        let client = Arc::new(MockLlmClient::new(vec![
            ScriptedResponse::Ok(
                r#"[{"subject":"Payment","action":"be made","modality":"SHALL","object":null,"value_type":"DURATION","normalized_value":"30 days","original_value":"30 days","conditions":[],"exceptions":[],"source_quote":"within 30 days of invoice","topic":"PAYMENT","is_override":false,"overrides_clause":null}]"#
                    .into(),
            ),
            ScriptedResponse::Ok(
                r#"[{"subject":"Payment","action":"pay","modality":"MUST","object":null,"value_type":"DURATION","normalized_value":"60 days","original_value":"60 days","conditions":[],"exceptions":[],"source_quote":"within 60 days","topic":"PAYMENT","is_override":false,"overrides_clause":null}]"#
                    .into(),
            ),
            ScriptedResponse::Ok(
                r#"{"has_conflict":true,"confidence":0.92,"conflict_type":"PaymentTiming","why":"payment windows differ","resolution":"align terms","evidence":["within 30 days of invoice","within 60 days"]}"#
                    .into(),
            ),
        ]));
        let store = Arc::new(InMemoryConflictStore::new());
        let orchestrator = Orchestrator::new(client, store);

        let result = orchestrator.run_conflict_detection(&clauses, &claim_based_options()).await.unwrap();

        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.classification, Classification::TrueConflict);
        assert_eq!(conflict.severity, Severity::High);
        assert!(conflict.confidence >= 0.85);
        assert!(conflict.left_evidence.quote.contains("30 days"));
        assert!(conflict.right_evidence.quote.contains("60 days"));
    }

    #[tokio::test]
    async fn scenario_s2_jurisdiction_mismatch_is_critical_regardless_of_confidence() {
        let clauses = vec![
            Clause::new("c1", 0, "This Agreement shall be governed by the laws of the UAE."),
            Clause::new("c2", 1, "All disputes shall be resolved in the courts of the United Kingdom."),
        ];
        let client = Arc::new(MockLlmClient::new(vec![
            ScriptedResponse::Ok(
                r#"[{"subject":"Agreement","action":"be governed","modality":"SHALL","object":null,"value_type":"JURISDICTION","normalized_value":"UAE","original_value":"UAE","conditions":[],"exceptions":[],"source_quote":"governed by the laws of the UAE","topic":"JURISDICTION","is_override":false,"overrides_clause":null}]"#
                    .into(),
            ),
            ScriptedResponse::Ok(
                r#"[{"subject":"Disputes","action":"be resolved","modality":"SHALL","object":null,"value_type":"JURISDICTION","normalized_value":"United Kingdom","original_value":"United Kingdom","conditions":[],"exceptions":[],"source_quote":"resolved in the courts of the United Kingdom","topic":"JURISDICTION","is_override":false,"overrides_clause":null}]"#
                    .into(),
            ),
            ScriptedResponse::Ok(
                r#"{"has_conflict":true,"confidence":0.88,"conflict_type":"JurisdictionMismatch","why":"conflicting jurisdiction clauses","resolution":"pick one forum","evidence":["governed by the laws of the UAE","resolved in the courts of the United Kingdom"]}"#
                    .into(),
            ),
        ]));
        let store = Arc::new(InMemoryConflictStore::new());
        let orchestrator = Orchestrator::new(client, store);

        let result = orchestrator.run_conflict_detection(&clauses, &claim_based_options()).await.unwrap();

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn scenario_s3_valid_override_suppresses_claim_based_candidate() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment shall be made on a Net 30 basis for all invoices.").with_number("3.1"),
            Clause::new("c2", 1, "Notwithstanding Clause 3.1, for government clients payment shall be made on a Net 60 basis.")
                .with_number("5.2"),
        ];
        let client = Arc::new(MockLlmClient::new(vec![
            ScriptedResponse::Ok(
                r#"[{"subject":"Payment","action":"be made","modality":"SHALL","object":null,"value_type":"DURATION","normalized_value":"30","original_value":"Net 30","conditions":[],"exceptions":[],"source_quote":"Net 30","topic":"PAYMENT","is_override":false,"overrides_clause":null}]"#
                    .into(),
            ),
            ScriptedResponse::Ok(
                r#"[{"subject":"Payment","action":"be made","modality":"SHALL","object":null,"value_type":"DURATION","normalized_value":"60","original_value":"Net 60","conditions":[],"exceptions":[],"source_quote":"Net 60","topic":"PAYMENT","is_override":true,"overrides_clause":"3.1"}]"#
                    .into(),
            ),
        ]));
        let store = Arc::new(InMemoryConflictStore::new());
        let orchestrator = Orchestrator::new(client, store);

        let result = orchestrator.run_conflict_detection(&clauses, &claim_based_options()).await.unwrap();

        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn scenario_s4_compatibility_gate_blocks_cross_function_pair() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment must be made via invoice in USD."),
            Clause::new("c2", 1, "Any amendment shall be made in writing and signed by both parties."),
        ];
        let client = Arc::new(MockLlmClient::new(Vec::new()));
        let store = Arc::new(InMemoryConflictStore::new());
        let orchestrator = Orchestrator::new(client, store);
        let options = RunOptions::new(Strategy::Hybrid, "test-model");

        let result = orchestrator.run_conflict_detection(&clauses, &options).await.unwrap();

        assert!(result.conflicts.is_empty());
        assert_eq!(result.stats.candidates_generated, 0);
    }
}
