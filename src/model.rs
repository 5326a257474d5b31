//! Core data model: Clause, Claim, CandidatePair, ClauseFunction, Conflict,
//! and the internal six-valued classification taxonomy.
//!
//! Clauses are immutable and referenced weakly by id -- they are not owned by
//! a `Run`. Claims and Conflicts are owned by the run that derived them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stable, opaque clause identifier. Identifier-equality, not
/// number-equality, is authoritative throughout the core.
pub type ClauseId = String;

/// An immutable unit of contract prose, owned by the external producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: ClauseId,
    pub number: Option<String>,
    pub heading: Option<String>,
    pub text: String,
    pub order_index: u32,
    pub is_bilingual: bool,
    pub secondary_text: Option<String>,
}

impl Clause {
    pub fn new(id: impl Into<String>, order_index: u32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number: None,
            heading: None,
            text: text.into(),
            order_index,
            is_bilingual: false,
            secondary_text: None,
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_secondary_text(mut self, text: impl Into<String>) -> Self {
        self.is_bilingual = true;
        self.secondary_text = Some(text.into());
        self
    }

    /// Combined text+heading used by deterministic keyword rules. Computed
    /// fresh rather than cached on the struct, since the struct is shared
    /// immutably across phases.
    pub fn classification_text(&self) -> String {
        match &self.heading {
            Some(h) => format!("{h} {}", self.text),
            None => self.text.clone(),
        }
    }
}

/// Normative modality of a Claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Must,
    Shall,
    May,
    MustNot,
    ShallNot,
    Prohibited,
    Permitted,
    Is,
    Defines,
}

impl Modality {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "MUST" => Self::Must,
            "SHALL" => Self::Shall,
            "MAY" => Self::May,
            "MUST_NOT" | "MUSTNOT" => Self::MustNot,
            "SHALL_NOT" | "SHALLNOT" => Self::ShallNot,
            "PROHIBITED" | "FORBIDDEN" => Self::Prohibited,
            "PERMITTED" | "ALLOWED" | "REQUIRED" => Self::Permitted,
            "DEFINES" => Self::Defines,
            _ => Self::Is,
        }
    }
}

/// Value-type enumeration for a Claim's normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Duration,
    Amount,
    Jurisdiction,
    Date,
    Percentage,
    Party,
    None,
}

impl ValueType {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "DURATION" => Self::Duration,
            "AMOUNT" => Self::Amount,
            "JURISDICTION" => Self::Jurisdiction,
            "DATE" => Self::Date,
            "PERCENTAGE" => Self::Percentage,
            "PARTY" => Self::Party,
            _ => Self::None,
        }
    }
}

/// Subject-matter topic of a Claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    Payment,
    Termination,
    Jurisdiction,
    Indemnification,
    Confidentiality,
    LockUp,
    Obligations,
    Definitions,
    General,
}

impl Topic {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAYMENT" => Self::Payment,
            "TERMINATION" => Self::Termination,
            "JURISDICTION" => Self::Jurisdiction,
            "INDEMNIFICATION" => Self::Indemnification,
            "CONFIDENTIALITY" => Self::Confidentiality,
            "LOCK_UP" | "LOCKUP" => Self::LockUp,
            "OBLIGATIONS" => Self::Obligations,
            "DEFINITIONS" => Self::Definitions,
            _ => Self::General,
        }
    }
}

/// A structured statement extracted from a clause's prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub clause_id: ClauseId,
    pub subject: String,
    pub action: String,
    pub modality: Modality,
    pub object: Option<String>,
    pub value_type: ValueType,
    pub normalized_value: String,
    pub original_value: String,
    pub conditions: Vec<String>,
    pub exceptions: Vec<String>,
    pub source_quote: String,
    pub topic: Topic,
    pub is_override: bool,
    pub overrides_clause: Option<String>,
}

impl Claim {
    /// Normalized subject used for equality checks in graph-builder rules
    /// (case-insensitive, trimmed).
    pub fn subject_key(&self) -> String {
        self.subject.trim().to_ascii_lowercase()
    }
}

/// One of twelve disjoint deterministic clause-function tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClauseFunction {
    Payment,
    Termination,
    GoverningLawJurisdiction,
    Confidentiality,
    IndemnityLiability,
    ForceMajeure,
    Notices,
    Amendments,
    Definitions,
    ScopeServices,
    ExecutionSignatures,
    MiscAdmin,
}

/// Provenance tag recording which rule/tier produced a CandidatePair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    OverrideReference,
    Section,
    Cluster,
    ClaimRule,
    CategoryLlm,
}

/// An unordered, canonicalized pair of clauses slated for adjudication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub clause_id_a: ClauseId,
    pub clause_id_b: ClauseId,
    pub provenance: HashSet<Provenance>,
    /// For the claim-based pipeline: the specific claims (indices into the
    /// run's claim set) that triggered this pair. Empty for hybrid-pipeline
    /// candidates.
    pub triggering_claims: Option<(usize, usize)>,
}

impl CandidatePair {
    /// Build a canonical pair: smaller clause id first, per the
    /// deduplication invariant.
    pub fn canonical(a: ClauseId, b: ClauseId, tag: Provenance) -> Self {
        let (clause_id_a, clause_id_b) = if a <= b { (a, b) } else { (b, a) };
        let mut provenance = HashSet::new();
        provenance.insert(tag);
        Self {
            clause_id_a,
            clause_id_b,
            provenance,
            triggering_claims: None,
        }
    }

    pub fn key(&self) -> (ClauseId, ClauseId) {
        (self.clause_id_a.clone(), self.clause_id_b.clone())
    }
}

/// Internal six-valued classification taxonomy. Only `TrueConflict` and
/// `Ambiguity` survive to the emitted `Conflict` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    TrueConflict,
    ValidOverride,
    Exception,
    Complementary,
    Ambiguity,
    NotRelated,
}

impl Classification {
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRUE_CONFLICT" => Some(Self::TrueConflict),
            "VALID_OVERRIDE" => Some(Self::ValidOverride),
            "EXCEPTION" => Some(Self::Exception),
            "COMPLEMENTARY" => Some(Self::Complementary),
            "AMBIGUITY" => Some(Self::Ambiguity),
            "NOT_RELATED" => Some(Self::NotRelated),
            _ => None,
        }
    }

    /// Whether this verdict is eligible to survive to an emitted Conflict.
    pub fn is_emittable(&self) -> bool {
        matches!(self, Self::TrueConflict | Self::Ambiguity)
    }
}

/// Severity of an emitted Conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// A `{quote, start_char, end_char}` evidence span. `quote` must equal
/// `clause.text[start_char..end_char]` for the clause it was extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub quote: String,
    pub start_char: usize,
    pub end_char: usize,
}

impl Evidence {
    /// Locate `quote` as a substring of `text` and build an Evidence span. If
    /// `quote` is not found verbatim, returns `None` so the caller can run
    /// the repair-by-substring-search policy described in the adjudicator.
    pub fn locate(text: &str, quote: &str) -> Option<Self> {
        text.find(quote).map(|start_char| Evidence {
            quote: quote.to_string(),
            start_char,
            end_char: start_char + quote.len(),
        })
    }

    /// Whether this span is consistent with `text` (invariant 2 in the
    /// testable-properties list).
    pub fn is_valid_for(&self, text: &str) -> bool {
        text.get(self.start_char..self.end_char) == Some(self.quote.as_str())
    }
}

/// A validated, evidence-backed conflict between two clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub left_clause_id: ClauseId,
    pub right_clause_id: ClauseId,
    pub classification: Classification,
    pub conflict_type: String,
    pub severity: Severity,
    pub confidence: f64,
    pub materiality: Severity,
    pub summary: String,
    pub explanation: String,
    pub left_evidence: Evidence,
    pub right_evidence: Evidence,
}

impl Conflict {
    /// Canonical unordered-pair key, for the pair-uniqueness invariant.
    pub fn pair_key(&self) -> (ClauseId, ClauseId) {
        if self.left_clause_id <= self.right_clause_id {
            (self.left_clause_id.clone(), self.right_clause_id.clone())
        } else {
            (self.right_clause_id.clone(), self.left_clause_id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_parses_known_and_unknown() {
        assert_eq!(Modality::parse_lenient("must_not"), Modality::MustNot);
        assert_eq!(Modality::parse_lenient("gibberish"), Modality::Is);
    }

    #[test]
    fn value_type_unknown_falls_back_to_none() {
        assert_eq!(ValueType::parse_lenient("nonsense"), ValueType::None);
    }

    #[test]
    fn candidate_pair_is_canonicalized() {
        let p1 = CandidatePair::canonical("b".into(), "a".into(), Provenance::Section);
        let p2 = CandidatePair::canonical("a".into(), "b".into(), Provenance::Section);
        assert_eq!(p1.key(), p2.key());
        assert_eq!(p1.clause_id_a, "a");
    }

    #[test]
    fn evidence_locate_and_validate() {
        let text = "Payment shall be made within 30 days of invoice.";
        let ev = Evidence::locate(text, "30 days").unwrap();
        assert!(ev.is_valid_for(text));
        assert_eq!(ev.start_char, text.find("30 days").unwrap());
    }

    #[test]
    fn evidence_locate_missing_returns_none() {
        assert!(Evidence::locate("short text", "not present here").is_none());
    }

    #[test]
    fn classification_emittable_set() {
        assert!(Classification::TrueConflict.is_emittable());
        assert!(Classification::Ambiguity.is_emittable());
        assert!(!Classification::NotRelated.is_emittable());
        assert!(!Classification::ValidOverride.is_emittable());
    }

    #[test]
    fn conflict_pair_key_is_order_independent() {
        let make = |l: &str, r: &str| Conflict {
            id: "x".into(),
            left_clause_id: l.into(),
            right_clause_id: r.into(),
            classification: Classification::TrueConflict,
            conflict_type: "ValueMismatch".into(),
            severity: Severity::High,
            confidence: 0.9,
            materiality: Severity::High,
            summary: "s".into(),
            explanation: "e".into(),
            left_evidence: Evidence {
                quote: "q".into(),
                start_char: 0,
                end_char: 1,
            },
            right_evidence: Evidence {
                quote: "q".into(),
                start_char: 0,
                end_char: 1,
            },
        };
        assert_eq!(make("a", "b").pair_key(), make("b", "a").pair_key());
    }
}
