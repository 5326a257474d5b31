//! Persistence interface (§6, consumed, minimal): the core does not
//! prescribe a store implementation. It accepts an object implementing
//! [`ConflictStore`] and ships one in-memory reference implementation.
//!
//! Grounded on the teacher's `LLMClient`/`AdversarialValidator` async_trait
//! shape (one trait at the seam, callers hold it behind `Arc<dyn Trait>`).
//! `rusqlite`, which the teacher uses for its own durable store, is
//! deliberately not carried forward -- see DESIGN.md.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::model::{Claim, Conflict};

#[async_trait]
pub trait ConflictStore: Send + Sync {
    async fn save_claims(&self, claims: &[Claim]);
    async fn save_conflicts(&self, conflicts: &[Conflict], run_id: &str);
    /// Idempotent-caching lookup (§4.7, invariant 10): conflicts already on
    /// record for `clause_version_id` at or above `min_confidence`.
    async fn lookup_cached_conflicts(&self, clause_version_id: &str, min_confidence: f64) -> Vec<Conflict>;
}

#[derive(Default)]
pub struct InMemoryConflictStore {
    conflicts_by_version: RwLock<HashMap<String, Vec<Conflict>>>,
}

impl InMemoryConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record conflicts under an explicit clause-version key. The core
    /// itself does not derive this key (that is the clause producer's
    /// responsibility per §6); tests and callers supply it directly.
    pub async fn seed(&self, clause_version_id: &str, conflicts: Vec<Conflict>) {
        self.conflicts_by_version
            .write()
            .await
            .insert(clause_version_id.to_string(), conflicts);
    }
}

#[async_trait]
impl ConflictStore for InMemoryConflictStore {
    async fn save_claims(&self, _claims: &[Claim]) {
        // The in-memory reference store only tracks conflicts for the
        // idempotent-caching check; claim persistence is a concern for a
        // real backing store.
    }

    async fn save_conflicts(&self, conflicts: &[Conflict], run_id: &str) {
        self.conflicts_by_version
            .write()
            .await
            .insert(run_id.to_string(), conflicts.to_vec());
    }

    async fn lookup_cached_conflicts(&self, clause_version_id: &str, min_confidence: f64) -> Vec<Conflict> {
        self.conflicts_by_version
            .read()
            .await
            .get(clause_version_id)
            .map(|conflicts| {
                conflicts
                    .iter()
                    .filter(|c| c.confidence >= min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Classification, Evidence, Severity};

    fn conflict(confidence: f64) -> Conflict {
        Conflict {
            id: "x".into(),
            left_clause_id: "a".into(),
            right_clause_id: "b".into(),
            classification: Classification::TrueConflict,
            conflict_type: "ValueMismatch".into(),
            severity: Severity::High,
            confidence,
            materiality: Severity::High,
            summary: "s".into(),
            explanation: "e".into(),
            left_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
            right_evidence: Evidence { quote: "q".into(), start_char: 0, end_char: 1 },
        }
    }

    #[tokio::test]
    async fn lookup_filters_by_min_confidence() {
        let store = InMemoryConflictStore::new();
        store.seed("v1", vec![conflict(0.9), conflict(0.6)]).await;
        let cached = store.lookup_cached_conflicts("v1", 0.85).await;
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn lookup_unknown_version_is_empty() {
        let store = InMemoryConflictStore::new();
        assert!(store.lookup_cached_conflicts("missing", 0.85).await.is_empty());
    }
}
