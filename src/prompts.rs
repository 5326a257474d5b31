//! Prompt templates.
//!
//! Prompts are addressed by name and treated as configuration, not control
//! flow (per the "prompt engineering is data, not code" design note): every
//! enumerated field is described, normalization rules are spelled out, the
//! classification rule set is included verbatim, and clause text truncation
//! is marked in the payload rather than silently applied. Grounded on the
//! teacher's `AdversarialValidator::build_prompt`, which assembles a prompt
//! from structured context rather than string concatenation ad hoc.

use crate::model::Clause;

const CLAUSE_TEXT_BUDGET: usize = 1000;

/// Truncate clause text to the per-prompt budget, marking the truncation
/// explicitly so the payload never silently loses information.
pub fn truncate_for_prompt(text: &str) -> (String, bool) {
    if text.chars().count() <= CLAUSE_TEXT_BUDGET {
        return (text.to_string(), false);
    }
    let truncated: String = text.chars().take(CLAUSE_TEXT_BUDGET).collect();
    (truncated, true)
}

const MODALITY_SET: &str = "MUST, SHALL, MAY, MUST_NOT, SHALL_NOT, PROHIBITED, PERMITTED, IS, DEFINES";
const VALUE_TYPE_SET: &str = "DURATION, AMOUNT, JURISDICTION, DATE, PERCENTAGE, PARTY, NONE";
const TOPIC_SET: &str =
    "PAYMENT, TERMINATION, JURISDICTION, INDEMNIFICATION, CONFIDENTIALITY, LOCK_UP, OBLIGATIONS, DEFINITIONS, GENERAL";

const NORMALIZATION_RULES: &str = "\
Normalize values as follows:
- dates: ISO-8601 (YYYY-MM-DD)
- durations: \"<N> <unit>\" with unit in {days, months, years}
- amounts: \"<ISO-currency> <decimal>\"
- percentages: \"<N>%\"
- jurisdictions: short code (UAE, UK, US, NY, EU, ...)";

/// Claim-extraction prompt (§4.2). One call per clause, JSON-mode.
pub fn claim_extraction_prompt(clause: &Clause) -> String {
    let (text, truncated) = truncate_for_prompt(&clause.text);
    format!(
        "Extract every normative claim from the clause below as a JSON array. \
Respond with JSON only.

Clause number: {}
Clause heading: {}
Clause text{}: {}

Each claim object must have: subject, action, modality (one of: {MODALITY_SET}), \
object (optional), value_type (one of: {VALUE_TYPE_SET}), normalized_value, \
original_value, conditions (array), exceptions (array), source_quote (must be an \
exact substring of the clause text above), topic (one of: {TOPIC_SET}), \
is_override (bool), overrides_clause (optional clause number string).

{NORMALIZATION_RULES}

Set is_override=true and populate overrides_clause when the text contains \
\"notwithstanding\", \"shall prevail\", or \"takes precedence\", capturing the \
target clause number referenced.",
        clause.number.as_deref().unwrap_or("(none)"),
        clause.heading.as_deref().unwrap_or("(none)"),
        if truncated { " (truncated)" } else { "" },
        text,
    )
}

/// Conflict-judge prompt (§4.4). One call per claim pair, JSON-mode.
pub fn conflict_judge_prompt(
    claim_a_desc: &str,
    claim_b_desc: &str,
    override_context: Option<&str>,
) -> String {
    let override_line = override_context
        .map(|c| format!("\nDetected override context: {c}\n"))
        .unwrap_or_default();
    format!(
        "Two claims extracted from a contract are given below. Decide whether they \
truly conflict. Respond with JSON only, matching exactly:
{{ \"has_conflict\": bool, \"confidence\": number in [0,1], \"conflict_type\": string, \
\"why\": string, \"resolution\": string, \"evidence\": [quote_a, quote_b] }}
{override_line}
Claim A: {claim_a_desc}
Claim B: {claim_b_desc}"
    )
}

const PAIR_ADJUDICATOR_SCHEMA: &str = "\
{ pair_index: number,
  classification: one of TRUE_CONFLICT, VALID_OVERRIDE, EXCEPTION, COMPLEMENTARY, AMBIGUITY, NOT_RELATED,
  confidence: number in [0,1],
  conflict_type: string,
  summary: string,
  left_evidence: { quote: string, start_char: number, end_char: number },
  right_evidence: { quote: string, start_char: number, end_char: number },
  materiality: one of HIGH, MEDIUM, LOW }";

const CLASSIFICATION_RULES: &str = "\
Classification rules:
- TRUE_CONFLICT requires same topic, same scenario, same party's obligation (when \
  applicable), and mutual exclusion.
- VALID_OVERRIDE when one clause explicitly subordinates the other.
- EXCEPTION when one carves out a subset the other governs.
- COMPLEMENTARY when the clauses act sequentially or on disjoint subjects.
- AMBIGUITY when the relationship is unclear due to vague wording.
- NOT_RELATED otherwise.";

/// One entry in a pair-adjudicator batch payload.
pub struct PairPayload<'a> {
    pub pair_index: usize,
    pub clause_a: &'a Clause,
    pub clause_b: &'a Clause,
    pub function_a: &'a str,
    pub function_b: &'a str,
}

/// Pair-adjudicator batch prompt (§4.6). Packs up to `adjudicator_pair_batch`
/// pairs into a single LLM call.
pub fn pair_adjudicator_prompt(variant_seed: Option<&str>, pairs: &[PairPayload<'_>]) -> String {
    let mut body = String::new();
    for p in pairs {
        let (text_a, trunc_a) = truncate_for_prompt(&p.clause_a.text);
        let (text_b, trunc_b) = truncate_for_prompt(&p.clause_b.text);
        body.push_str(&format!(
            "\n--- pair {} ---\nClause A (number={}, heading={}, function={}{}): {}\n\
Clause B (number={}, heading={}, function={}{}): {}\n",
            p.pair_index,
            p.clause_a.number.as_deref().unwrap_or("(none)"),
            p.clause_a.heading.as_deref().unwrap_or("(none)"),
            p.function_a,
            if trunc_a { ", truncated" } else { "" },
            text_a,
            p.clause_b.number.as_deref().unwrap_or("(none)"),
            p.clause_b.heading.as_deref().unwrap_or("(none)"),
            p.function_b,
            if trunc_b { ", truncated" } else { "" },
            text_b,
        ));
    }
    let phrasing = variant_seed
        .map(|s| format!("\nPhrase your independent analysis with this emphasis: {s}\n"))
        .unwrap_or_default();
    format!(
        "Classify the relationship of each contract clause pair below. Respond with a \
JSON array only, one object per pair, matching exactly:
{PAIR_ADJUDICATOR_SCHEMA}

{CLASSIFICATION_RULES}
{phrasing}
{body}"
    )
}

/// Verification-pass prompt (§4.6): a single call per surviving verdict with
/// the exact quoted spans, asking whether the conflict truly holds.
pub fn verification_prompt(
    clause_a: &Clause,
    clause_b: &Clause,
    left_quote: &str,
    right_quote: &str,
    claimed_classification: &str,
) -> String {
    format!(
        "A prior pass classified the relationship between two contract clauses as \
{claimed_classification}, citing the quoted spans below. Re-examine independently \
with the full clause text and answer strictly: is this truly a conflict? Respond \
with JSON only: {{ \"has_conflict\": bool, \"confidence\": number in [0,1] }}

Clause A (full text): {}
Cited span A: \"{left_quote}\"

Clause B (full text): {}
Cited span B: \"{right_quote}\"",
        clause_a.text, clause_b.text,
    )
}

/// Self-check prompt for the N↔N streaming adapter: a clause compared
/// against itself to detect internal inconsistency.
pub fn self_check_prompt(clause: &Clause) -> String {
    format!(
        "Examine the single contract clause below for internal inconsistency \
(self-contradiction). Respond with JSON only: {{ \"has_conflict\": bool, \
\"confidence\": number in [0,1], \"conflict_type\": string, \"why\": string }}

Clause: {}",
        clause.text
    )
}
