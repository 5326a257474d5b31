//! Multi-Tier Candidate Generator (§4.5): the hybrid pipeline's candidate
//! source, independent of Claims. Four tiers union into one deduplicated,
//! canonicalized, provenance-tagged candidate set, then a compatibility
//! gate prunes cross-function noise.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::llm::ClauseFunctionCache;
use crate::model::{CandidatePair, Clause, ClauseFunction, Provenance};

const OVERRIDE_KEYWORDS: &[&str] = &[
    "notwithstanding",
    "subject to",
    "except as provided",
    "provided that",
    "unless otherwise",
    "save as",
    "however",
];

const CONTRADICTORY_TERM_PAIRS: &[(&str, &str)] = &[
    ("shall", "shall not"),
    ("must", "must not"),
    ("mandatory", "optional"),
    ("required", "not required"),
    ("permitted", "prohibited"),
    ("allowed", "forbidden"),
];

const SECTION_TIER_CAP: usize = 50;
const CLUSTER_TIER_CAP: usize = 30;

fn clause_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:clause|section|article|paragraph)\s+(\d+(?:\.\d+)*)").unwrap()
    })
}

/// Deterministic ClauseFunction tagging by keyword over `text`+`heading`
/// (Tier 0). First matching rule wins; falls back to `MiscAdmin`.
pub fn classify_clause_function(clause: &Clause) -> ClauseFunction {
    let text = clause.classification_text().to_ascii_lowercase();
    const RULES: &[(&[&str], ClauseFunction)] = &[
        (&["notwithstanding", "amendment"], ClauseFunction::Amendments),
        (&["notice", "serve"], ClauseFunction::Notices),
        (&["indemnif", "liabilit"], ClauseFunction::IndemnityLiability),
        (&["force majeure", "act of god"], ClauseFunction::ForceMajeure),
        (&["governing law", "jurisdiction", "governed by the laws"], ClauseFunction::GoverningLawJurisdiction),
        (&["confidential", "non-disclosure"], ClauseFunction::Confidentiality),
        (&["terminat", "expir"], ClauseFunction::Termination),
        (&["payment", "invoice", "fee"], ClauseFunction::Payment),
        (&["scope of services", "deliverable"], ClauseFunction::ScopeServices),
        (&["signature", "executed", "counterpart"], ClauseFunction::ExecutionSignatures),
        (&["definition", "interpretation", "means"], ClauseFunction::Definitions),
    ];
    for (keywords, function) in RULES {
        if keywords.iter().any(|k| text.contains(k)) {
            return *function;
        }
    }
    ClauseFunction::MiscAdmin
}

/// Resolves a clause's function, checking `cache` first.
pub async fn clause_function_cached(clause: &Clause, cache: &ClauseFunctionCache) -> ClauseFunction {
    if let Some(hit) = cache.get(&clause.text, clause.heading.as_deref()).await {
        return hit;
    }
    let function = classify_clause_function(clause);
    cache.insert(&clause.text, clause.heading.as_deref(), function).await;
    function
}

/// The seven clustering topics used by Tier 3, distinct from the
/// claim-level `Topic` enum (§4.5 names its own seven-value set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterTopic {
    Payment,
    Termination,
    Liability,
    Confidentiality,
    IntellectualProperty,
    Warranty,
    Dispute,
}

/// Keyword-based clustering, swappable for an embedding-backed
/// implementation behind the same interface (§9 open question).
pub trait TopicClusterer: Send + Sync {
    fn topics_for(&self, clause: &Clause) -> Vec<ClusterTopic>;
}

pub struct KeywordTopicClusterer;

impl TopicClusterer for KeywordTopicClusterer {
    fn topics_for(&self, clause: &Clause) -> Vec<ClusterTopic> {
        let text = clause.classification_text().to_ascii_lowercase();
        const RULES: &[(&[&str], ClusterTopic)] = &[
            (&["payment", "invoice", "fee"], ClusterTopic::Payment),
            (&["terminat", "expir"], ClusterTopic::Termination),
            (&["liabilit", "indemnif"], ClusterTopic::Liability),
            (&["confidential", "non-disclosure"], ClusterTopic::Confidentiality),
            (&["intellectual property", "patent", "copyright", "trademark"], ClusterTopic::IntellectualProperty),
            (&["warrant"], ClusterTopic::Warranty),
            (&["dispute", "arbitration", "litigation"], ClusterTopic::Dispute),
        ];
        RULES
            .iter()
            .filter(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
            .map(|(_, topic)| *topic)
            .collect()
    }
}

/// Whether `function_a`/`function_b` are compatible for adjudication absent
/// a Tier-1 bypass: same function always allowed, otherwise only the
/// explicit indemnity/confidentiality cross-examination is permitted.
pub fn functions_compatible(function_a: ClauseFunction, function_b: ClauseFunction) -> bool {
    if function_a == function_b {
        return true;
    }
    matches!(
        (function_a, function_b),
        (ClauseFunction::IndemnityLiability, ClauseFunction::Confidentiality)
            | (ClauseFunction::Confidentiality, ClauseFunction::IndemnityLiability)
    )
}

fn tier1_candidates(clauses: &[Clause]) -> Vec<CandidatePair> {
    let by_number: HashMap<&str, &Clause> = clauses
        .iter()
        .filter_map(|c| c.number.as_deref().map(|n| (n, c)))
        .collect();

    let mut out = Vec::new();

    for clause in clauses {
        let text_lower = clause.text.to_ascii_lowercase();
        if OVERRIDE_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
            for cap in clause_reference_regex().captures_iter(&clause.text) {
                let referenced_number = &cap[1];
                if let Some(target) = by_number.get(referenced_number) {
                    if target.id != clause.id {
                        out.push(CandidatePair::canonical(
                            clause.id.clone(),
                            target.id.clone(),
                            Provenance::OverrideReference,
                        ));
                    }
                }
            }
        }
    }

    let by_heading: HashMap<Option<&str>, Vec<&Clause>> =
        clauses.iter().fold(HashMap::new(), |mut acc, c| {
            acc.entry(c.heading.as_deref()).or_default().push(c);
            acc
        });

    for group in by_heading.values() {
        for (i, a) in group.iter().enumerate() {
            let a_lower = a.text.to_ascii_lowercase();
            for b in &group[i + 1..] {
                let b_lower = b.text.to_ascii_lowercase();
                let contradictory = CONTRADICTORY_TERM_PAIRS.iter().any(|(x, y)| {
                    (a_lower.contains(x) && b_lower.contains(y))
                        || (a_lower.contains(y) && b_lower.contains(x))
                });
                if contradictory {
                    out.push(CandidatePair::canonical(a.id.clone(), b.id.clone(), Provenance::OverrideReference));
                }
            }
        }
    }

    out
}

fn tier2_candidates(clauses: &[Clause]) -> Vec<CandidatePair> {
    let mut by_heading: HashMap<Option<&str>, Vec<&Clause>> = HashMap::new();
    for clause in clauses {
        by_heading.entry(clause.heading.as_deref()).or_default().push(clause);
    }

    let mut out = Vec::new();
    for group in by_heading.values_mut() {
        group.sort_by_key(|c| c.order_index);
        group.truncate(SECTION_TIER_CAP);
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                out.push(CandidatePair::canonical(a.id.clone(), b.id.clone(), Provenance::Section));
            }
        }
    }
    out
}

fn tier3_candidates(clauses: &[Clause], clusterer: &dyn TopicClusterer) -> Vec<CandidatePair> {
    let mut clusters: HashMap<ClusterTopic, Vec<&Clause>> = HashMap::new();
    for clause in clauses {
        for topic in clusterer.topics_for(clause) {
            clusters.entry(topic).or_default().push(clause);
        }
    }

    let mut out = Vec::new();
    for group in clusters.values_mut() {
        group.sort_by_key(|c| c.order_index);
        group.truncate(CLUSTER_TIER_CAP);
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                out.push(CandidatePair::canonical(a.id.clone(), b.id.clone(), Provenance::Cluster));
            }
        }
    }
    out
}

/// Counts reported alongside the final candidate set, feeding `PhaseStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationStats {
    pub total_before_gate: usize,
    pub total_after_gate: usize,
}

/// Runs all four tiers, unions results (merging provenance on duplicate
/// pairs), and applies the compatibility gate.
pub async fn generate_candidates(
    clauses: &[Clause],
    clusterer: &dyn TopicClusterer,
    cache: &ClauseFunctionCache,
) -> (Vec<CandidatePair>, GenerationStats) {
    let mut functions: HashMap<&str, ClauseFunction> = HashMap::with_capacity(clauses.len());
    for clause in clauses {
        functions.insert(clause.id.as_str(), clause_function_cached(clause, cache).await);
    }

    let tier1 = tier1_candidates(clauses);
    let tier1_keys: HashSet<(String, String)> = tier1.iter().map(|p| p.key()).collect();

    let mut merged: HashMap<(String, String), CandidatePair> = HashMap::new();
    for pair in tier1
        .into_iter()
        .chain(tier2_candidates(clauses))
        .chain(tier3_candidates(clauses, clusterer))
    {
        merged
            .entry(pair.key())
            .and_modify(|existing| existing.provenance.extend(pair.provenance.iter().copied()))
            .or_insert(pair);
    }

    let total_before_gate = merged.len();
    let final_pairs: Vec<CandidatePair> = merged
        .into_values()
        .filter(|pair| {
            if tier1_keys.contains(&pair.key()) {
                return true;
            }
            let fn_a = functions.get(pair.clause_id_a.as_str()).copied().unwrap_or(ClauseFunction::MiscAdmin);
            let fn_b = functions.get(pair.clause_id_b.as_str()).copied().unwrap_or(ClauseFunction::MiscAdmin);
            functions_compatible(fn_a, fn_b)
        })
        .collect();

    let stats = GenerationStats {
        total_before_gate,
        total_after_gate: final_pairs.len(),
    };
    (final_pairs, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tags_payment_clause() {
        let clause = Clause::new("c1", 0, "Payment shall be made via invoice in USD.");
        assert_eq!(classify_clause_function(&clause), ClauseFunction::Payment);
    }

    #[test]
    fn classify_tags_amendments_clause() {
        let clause = Clause::new("c1", 0, "Notwithstanding the foregoing, any amendment must be in writing.");
        assert_eq!(classify_clause_function(&clause), ClauseFunction::Amendments);
    }

    #[test]
    fn compatibility_gate_allows_same_function() {
        assert!(functions_compatible(ClauseFunction::Payment, ClauseFunction::Payment));
    }

    #[test]
    fn compatibility_gate_allows_indemnity_confidentiality_cross() {
        assert!(functions_compatible(ClauseFunction::IndemnityLiability, ClauseFunction::Confidentiality));
        assert!(functions_compatible(ClauseFunction::Confidentiality, ClauseFunction::IndemnityLiability));
    }

    #[test]
    fn compatibility_gate_blocks_payment_vs_amendments() {
        assert!(!functions_compatible(ClauseFunction::Payment, ClauseFunction::Amendments));
    }

    #[test]
    fn compatibility_gate_blocks_definitions_cross_function() {
        assert!(!functions_compatible(ClauseFunction::Definitions, ClauseFunction::Payment));
    }

    #[tokio::test]
    async fn blocked_cross_function_pair_absent_without_tier1_provenance() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment must be made via invoice in USD.").with_heading("Payment"),
            Clause::new("c2", 1, "Any amendment shall be made in writing and signed by both parties.")
                .with_heading("Amendments"),
        ];
        let cache = ClauseFunctionCache::new();
        let (candidates, stats) = generate_candidates(&clauses, &KeywordTopicClusterer, &cache).await;
        assert!(candidates.is_empty());
        assert_eq!(stats.total_after_gate, 0);
    }

    #[test]
    fn tier1_extracts_referenced_clause_by_number() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment is Net 30.").with_number("3.1"),
            Clause::new("c2", 1, "Notwithstanding Clause 3.1, for government clients payment is Net 60.")
                .with_number("5.2"),
        ];
        let pairs = tier1_candidates(&clauses);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key(), ("c1".to_string(), "c2".to_string()));
    }
}
