//! Claim Extractor (§4.2): turns a clause's prose into 0-N structured
//! claims with normalized values.
//!
//! Grounded on the teacher's `BatchExecutor`-driven phase shape (one LLM
//! call per unit of work, bounded concurrency, per-unit failure absorbed)
//! applied to a JSON-mode extraction call instead of a chat completion.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::llm::{BatchConfig, BatchExecutor, BatchedQuery, GenerateOptions, LLMClient};
use crate::model::{Clause, Claim, Modality, Topic, ValueType};
use crate::prompts::claim_extraction_prompt;

const MIN_SUBSTRING_MATCH: usize = 8;
const MIN_SUBSTANTIVE_LEN: usize = 30;

/// Whether a clause is non-substantive and should be skipped without an LLM
/// call (§4.2 pre-filter).
pub fn is_non_substantive(clause: &Clause) -> bool {
    let trimmed = clause.text.trim();
    if trimmed.chars().count() < MIN_SUBSTANTIVE_LEN {
        return true;
    }
    if is_bare_label(trimmed) {
        return true;
    }
    if looks_like_table_of_contents(trimmed) {
        return true;
    }
    if is_heading_without_verb(trimmed) {
        return true;
    }
    false
}

fn is_bare_label(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || c == '.' || c == '-')
        && text.chars().any(|c| c.is_ascii_digit())
        && text.split_whitespace().count() <= 3
}

fn looks_like_table_of_contents(text: &str) -> bool {
    let dots = text.chars().filter(|&c| c == '.').count();
    let has_trailing_page_number = text
        .trim_end()
        .rsplit(' ')
        .next()
        .map(|tok| tok.chars().all(|c| c.is_ascii_digit()) && !tok.is_empty())
        .unwrap_or(false);
    dots >= 5 && has_trailing_page_number
}

fn is_heading_without_verb(text: &str) -> bool {
    const COMMON_VERBS: &[&str] = &[
        "shall", "must", "may", "will", "is", "are", "has", "have", "does", "do",
        "agrees", "agree", "terminates", "applies", "means", "includes",
    ];
    let lower = text.to_ascii_lowercase();
    text.split_whitespace().count() <= 6 && !COMMON_VERBS.iter().any(|v| lower.contains(v))
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    subject: Option<String>,
    action: Option<String>,
    modality: Option<String>,
    object: Option<String>,
    value_type: Option<String>,
    normalized_value: Option<String>,
    original_value: Option<String>,
    #[serde(default)]
    conditions: Vec<String>,
    #[serde(default)]
    exceptions: Vec<String>,
    source_quote: Option<String>,
    topic: Option<String>,
    #[serde(default)]
    is_override: bool,
    overrides_clause: Option<String>,
}

/// Validate and auto-fix a single raw claim against `clause`. Returns `None`
/// when a required field is missing or the source quote cannot be repaired.
fn validate_and_fix(raw: RawClaim, clause: &Clause) -> Option<Claim> {
    let subject = raw.subject?;
    let action = raw.action?;
    let modality = raw.modality.as_deref().map(Modality::parse_lenient)?;
    let topic = raw.topic.as_deref().map(Topic::parse_lenient)?;
    let raw_quote = raw.source_quote?;

    let source_quote = if clause.text.contains(&raw_quote) {
        raw_quote
    } else {
        longest_matching_substring(&clause.text, &raw_quote)?
    };

    let value_type = raw
        .value_type
        .as_deref()
        .map(ValueType::parse_lenient)
        .unwrap_or(ValueType::None);

    let normalized_value = if value_type == ValueType::None {
        String::new()
    } else {
        raw.normalized_value.unwrap_or_default()
    };

    Some(Claim {
        clause_id: clause.id.clone(),
        subject,
        action,
        modality,
        object: raw.object,
        value_type,
        normalized_value,
        original_value: raw.original_value.unwrap_or_default(),
        conditions: raw.conditions,
        exceptions: raw.exceptions,
        source_quote,
        topic,
        is_override: raw.is_override,
        overrides_clause: raw.overrides_clause,
    })
}

/// Find the longest substring of `candidate` (scanning shrinking prefixes)
/// that occurs verbatim in `text`, subject to the minimum-match floor.
fn longest_matching_substring(text: &str, candidate: &str) -> Option<String> {
    let chars: Vec<char> = candidate.chars().collect();
    let mut len = chars.len();
    while len >= MIN_SUBSTRING_MATCH {
        let slice: String = chars[..len].iter().collect();
        if text.contains(&slice) {
            return Some(slice);
        }
        len -= 1;
    }
    None
}

fn parse_claims_response(raw: &str, clause: &Clause) -> Vec<Claim> {
    let parsed: Vec<RawClaim> = match serde_json::from_str(raw) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(clause_id = %clause.id, error = %e, "claim extraction response was not a JSON array");
            return Vec::new();
        }
    };
    parsed
        .into_iter()
        .filter_map(|raw_claim| validate_and_fix(raw_claim, clause))
        .collect()
}

/// Extracts structured claims from a clause set, one LLM call per
/// substantive clause, bounded to `claim_batch` concurrent calls.
pub struct ClaimExtractor<C: LLMClient> {
    client: Arc<C>,
}

impl<C: LLMClient + 'static> ClaimExtractor<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, clauses, cancellation), fields(clause_count = clauses.len()))]
    pub async fn extract_all(
        &self,
        clauses: &[Clause],
        model: &str,
        keep_alive: &str,
        claim_batch: usize,
        cancellation: &CancellationToken,
    ) -> Vec<Claim> {
        let mut substantive: Vec<&Clause> = Vec::new();
        for clause in clauses {
            if is_non_substantive(clause) {
                debug!(clause_id = %clause.id, "clause skipped by claim pre-filter");
            } else {
                substantive.push(clause);
            }
        }

        let queries = substantive
            .iter()
            .enumerate()
            .map(|(i, clause)| BatchedQuery {
                index: i,
                prompt: claim_extraction_prompt(clause),
                options: GenerateOptions::structured(model).with_keep_alive(keep_alive),
            })
            .collect();

        let executor = BatchExecutor::new(
            Arc::clone(&self.client),
            BatchConfig {
                max_parallel: claim_batch.max(1),
                ..BatchConfig::default()
            },
        );
        let results = executor.execute(queries, cancellation).await;

        let mut per_clause: Vec<(u32, Vec<Claim>)> = Vec::with_capacity(substantive.len());
        for result in results.into_inner() {
            let clause = substantive[result.index];
            let claims = match result.outcome {
                Ok(text) => parse_claims_response(&text, clause),
                Err(err) => {
                    warn!(clause_id = %clause.id, error = %err, "claim extraction call failed, skipping clause");
                    Vec::new()
                }
            };
            per_clause.push((clause.order_index, claims));
        }

        per_clause.sort_by_key(|(order_index, _)| *order_index);
        per_clause.into_iter().flat_map(|(_, claims)| claims).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_clause_is_non_substantive() {
        let clause = Clause::new("c1", 0, "3.1");
        assert!(is_non_substantive(&clause));
    }

    #[test]
    fn substantive_clause_passes_prefilter() {
        let clause = Clause::new("c1", 0, "Payment shall be made within 30 days of invoice date.");
        assert!(!is_non_substantive(&clause));
    }

    #[test]
    fn toc_heuristic_rejects_dotted_leader_with_page_number() {
        let clause = Clause::new("c1", 0, "Payment Terms............................. 12");
        assert!(is_non_substantive(&clause));
    }

    #[test]
    fn bare_heading_without_verb_is_non_substantive() {
        let clause = Clause::new("c1", 0, "Governing Law and Jurisdiction");
        assert!(is_non_substantive(&clause));
    }

    #[test]
    fn longest_matching_substring_repairs_near_miss_quote() {
        let text = "Payment shall be made within 30 days of invoice.";
        let fixed = longest_matching_substring(text, "within 30 days of invoice!!!");
        assert_eq!(fixed, Some("within 30 days of invoice".to_string()));
    }

    #[test]
    fn validate_and_fix_drops_claim_missing_required_field() {
        let clause = Clause::new("c1", 0, "Payment shall be made within 30 days.");
        let raw = RawClaim {
            subject: None,
            action: Some("be made".into()),
            modality: Some("SHALL".into()),
            object: None,
            value_type: Some("DURATION".into()),
            normalized_value: Some("30 days".into()),
            original_value: Some("30 days".into()),
            conditions: vec![],
            exceptions: vec![],
            source_quote: Some("within 30 days".into()),
            topic: Some("PAYMENT".into()),
            is_override: false,
            overrides_clause: None,
        };
        assert!(validate_and_fix(raw, &clause).is_none());
    }

    #[test]
    fn validate_and_fix_coerces_unknown_value_type_to_none_and_clears_value() {
        let clause = Clause::new("c1", 0, "Payment shall be made promptly.");
        let raw = RawClaim {
            subject: Some("Payment".into()),
            action: Some("be made".into()),
            modality: Some("SHALL".into()),
            object: None,
            value_type: Some("BOGUS".into()),
            normalized_value: Some("ignored".into()),
            original_value: Some("promptly".into()),
            conditions: vec![],
            exceptions: vec![],
            source_quote: Some("be made promptly".into()),
            topic: Some("PAYMENT".into()),
            is_override: false,
            overrides_clause: None,
        };
        let claim = validate_and_fix(raw, &clause).unwrap();
        assert_eq!(claim.value_type, ValueType::None);
        assert_eq!(claim.normalized_value, "");
    }
}
