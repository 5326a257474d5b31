//! Conflict Graph Builder (§4.3): deterministic rules over a claim set,
//! emitting candidate claim pairs for the claim-based pipeline.
//!
//! Pure and side-effect free by construction -- no suspension points, no
//! LLM calls -- satisfying the determinism property tested in §8.

use std::collections::HashMap;

use crate::model::{Claim, Clause, Modality, Provenance, CandidatePair, ValueType};

const OPPOSITE_MODALITY_PAIRS: &[(Modality, Modality)] = &[
    (Modality::Must, Modality::MustNot),
    (Modality::Shall, Modality::ShallNot),
    (Modality::Must, Modality::Prohibited),
    (Modality::Permitted, Modality::Prohibited),
];

/// One candidate pair plus the pair of claim indices (into the input slice)
/// that triggered it and the rule name for diagnostics.
pub struct GraphCandidate {
    pub pair: CandidatePair,
    pub rule: &'static str,
}

/// Applies the seven deterministic rules over `claims`, using `clauses` only
/// to resolve override-reference clause numbers. Running twice on the same
/// input yields a byte-identical output (invariant 6).
pub fn build_candidate_pairs(claims: &[Claim], clauses: &[Clause]) -> Vec<GraphCandidate> {
    let clause_number_by_id: HashMap<&str, &str> = clauses
        .iter()
        .filter_map(|c| c.number.as_deref().map(|n| (c.id.as_str(), n)))
        .collect();

    let mut buckets: HashMap<crate::model::Topic, Vec<usize>> = HashMap::new();
    for (i, claim) in claims.iter().enumerate() {
        buckets.entry(claim.topic).or_default().push(i);
    }

    let mut out = Vec::new();
    let mut seen_pairs = std::collections::HashSet::new();

    for indices in buckets.values() {
        for (pos, &i) in indices.iter().enumerate() {
            for &j in &indices[pos + 1..] {
                let a = &claims[i];
                let b = &claims[j];
                if a.clause_id == b.clause_id {
                    continue;
                }
                if is_override_suppressed(a, b, &clause_number_by_id)
                    || is_override_suppressed(b, a, &clause_number_by_id)
                {
                    continue;
                }
                if let Some(rule) = matching_rule(a, b) {
                    let candidate_pair = CandidatePair::canonical(
                        a.clause_id.clone(),
                        b.clause_id.clone(),
                        Provenance::ClaimRule,
                    );
                    let key = candidate_pair.key();
                    if seen_pairs.insert(key) {
                        let mut candidate_pair = candidate_pair;
                        candidate_pair.triggering_claims = Some((i, j));
                        out.push(GraphCandidate { pair: candidate_pair, rule });
                    }
                }
            }
        }
    }
    out
}

fn is_override_suppressed(
    maybe_overriding: &Claim,
    other: &Claim,
    clause_number_by_id: &HashMap<&str, &str>,
) -> bool {
    if !maybe_overriding.is_override {
        return false;
    }
    let Some(target) = maybe_overriding.overrides_clause.as_deref() else {
        return false;
    };
    clause_number_by_id
        .get(other.clause_id.as_str())
        .is_some_and(|n| *n == target)
}

fn matching_rule(a: &Claim, b: &Claim) -> Option<&'static str> {
    if same_subject(a, b) && is_opposite_modality(a.modality, b.modality) {
        return Some("opposite_modality");
    }
    if same_subject(a, b)
        && a.value_type != ValueType::None
        && a.value_type == b.value_type
        && a.normalized_value != b.normalized_value
    {
        return Some("value_mismatch");
    }
    if a.value_type == ValueType::Jurisdiction
        && b.value_type == ValueType::Jurisdiction
        && a.normalized_value != b.normalized_value
    {
        return Some("jurisdiction_conflict");
    }
    if a.topic == crate::model::Topic::Payment
        && b.topic == crate::model::Topic::Payment
        && a.value_type == ValueType::Duration
        && b.value_type == ValueType::Duration
        && a.normalized_value != b.normalized_value
    {
        return Some("payment_timing");
    }
    if a.topic == crate::model::Topic::LockUp
        && b.topic == crate::model::Topic::LockUp
        && a.value_type == ValueType::Duration
        && b.value_type == ValueType::Duration
        && a.normalized_value != b.normalized_value
    {
        return Some("lock_up_duration");
    }
    if a.topic == crate::model::Topic::Confidentiality
        && b.topic == crate::model::Topic::Confidentiality
        && a.value_type == ValueType::Duration
        && b.value_type == ValueType::Duration
        && a.normalized_value != b.normalized_value
    {
        return Some("confidentiality_duration");
    }
    if a.topic == crate::model::Topic::Indemnification
        && b.topic == crate::model::Topic::Indemnification
        && a.value_type == ValueType::Amount
        && b.value_type == ValueType::Amount
        && a.normalized_value != b.normalized_value
    {
        return Some("liability_cap");
    }
    None
}

fn same_subject(a: &Claim, b: &Claim) -> bool {
    a.subject_key() == b.subject_key()
}

fn is_opposite_modality(a: Modality, b: Modality) -> bool {
    OPPOSITE_MODALITY_PAIRS
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Topic;

    fn claim(clause_id: &str, subject: &str, modality: Modality, topic: Topic) -> Claim {
        Claim {
            clause_id: clause_id.into(),
            subject: subject.into(),
            action: "be made".into(),
            modality,
            object: None,
            value_type: ValueType::None,
            normalized_value: String::new(),
            original_value: String::new(),
            conditions: vec![],
            exceptions: vec![],
            source_quote: "quote".into(),
            topic,
            is_override: false,
            overrides_clause: None,
        }
    }

    #[test]
    fn opposite_modality_same_subject_yields_candidate() {
        let a = claim("c1", "Contractor", Modality::Must, Topic::Obligations);
        let b = claim("c2", "Contractor", Modality::MustNot, Topic::Obligations);
        let candidates = build_candidate_pairs(&[a, b], &[]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].rule, "opposite_modality");
    }

    #[test]
    fn different_subject_does_not_trigger_opposite_modality() {
        let a = claim("c1", "Contractor", Modality::Must, Topic::Obligations);
        let b = claim("c2", "Client", Modality::MustNot, Topic::Obligations);
        assert!(build_candidate_pairs(&[a, b], &[]).is_empty());
    }

    #[test]
    fn value_mismatch_same_subject_and_type() {
        let mut a = claim("c1", "Payment", Modality::Shall, Topic::Payment);
        a.value_type = ValueType::Duration;
        a.normalized_value = "30 days".into();
        let mut b = claim("c2", "Payment", Modality::Must, Topic::Payment);
        b.value_type = ValueType::Duration;
        b.normalized_value = "60 days".into();
        let candidates = build_candidate_pairs(&[a, b], &[]);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn override_suppression_removes_candidate() {
        let clauses = vec![
            Clause::new("c1", 0, "Payment is Net 30.").with_number("3.1"),
            Clause::new("c2", 1, "Notwithstanding Clause 3.1, Net 60.").with_number("5.2"),
        ];
        let mut a = claim("c1", "Payment", Modality::Shall, Topic::Payment);
        a.value_type = ValueType::Duration;
        a.normalized_value = "30 days".into();
        let mut b = claim("c2", "Payment", Modality::Shall, Topic::Payment);
        b.value_type = ValueType::Duration;
        b.normalized_value = "60 days".into();
        b.is_override = true;
        b.overrides_clause = Some("3.1".into());

        assert!(build_candidate_pairs(&[a, b], &clauses).is_empty());
    }

    #[test]
    fn candidate_set_is_deterministic_across_runs() {
        let a = claim("c1", "Contractor", Modality::Must, Topic::Obligations);
        let b = claim("c2", "Contractor", Modality::MustNot, Topic::Obligations);
        let first = build_candidate_pairs(&[a.clone(), b.clone()], &[]);
        let second = build_candidate_pairs(&[a, b], &[]);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].pair.key(), second[0].pair.key());
    }

    proptest::proptest! {
        // Invariant 6: the graph builder is pure, so running it twice on the
        // same claim set (regardless of how many claims, subjects, or
        // modalities) must yield the same candidate keys in the same order.
        #[test]
        fn build_candidate_pairs_is_pure(
            subjects in proptest::collection::vec("[A-Za-z]{1,6}", 1..6),
            modality_bits in proptest::collection::vec(proptest::bool::ANY, 1..6),
        ) {
            let modalities = [Modality::Must, Modality::MustNot];
            let claims: Vec<Claim> = subjects
                .iter()
                .zip(modality_bits.iter())
                .enumerate()
                .map(|(i, (subject, bit))| {
                    claim(&format!("c{i}"), subject, modalities[*bit as usize], Topic::Obligations)
                })
                .collect();

            let first = build_candidate_pairs(&claims, &[]);
            let second = build_candidate_pairs(&claims, &[]);
            let first_keys: Vec<_> = first.iter().map(|c| c.pair.key()).collect();
            let second_keys: Vec<_> = second.iter().map(|c| c.pair.key()).collect();
            prop_assert_eq!(first_keys, second_keys);
        }
    }
}
