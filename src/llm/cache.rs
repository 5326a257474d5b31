//! Clause-function cache.
//!
//! Tier 0 of the candidate generator (§4.5) tags every clause with a
//! `ClauseFunction`; the same clause text recurs across strategies and
//! across repeated runs against the same document, so the tag is cached by
//! content hash rather than recomputed. Keyed on `sha2::Sha256` of
//! `(text, heading)`, per the "global mutable state" design note: one cache
//! instance per process, explicit construction, no implicit statics shared
//! across runs. Grounded on the teacher's `PromptCache`/`CacheKey` shape
//! (a hashed key, a stats-tracking wrapper around a map) with the
//! Anthropic-specific cache-control framing dropped, since nothing here
//! talks to a caching-aware provider API.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::model::ClauseFunction;

/// Content-addressed key: `sha256(text || '\0' || heading)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_clause_text(text: &str, heading: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(heading.unwrap_or("").as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Process-scoped cache from clause content to its classified function tag.
pub struct ClauseFunctionCache {
    entries: RwLock<HashMap<CacheKey, ClauseFunction>>,
    stats: RwLock<CacheStats>,
}

impl ClauseFunctionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub async fn get(&self, text: &str, heading: Option<&str>) -> Option<ClauseFunction> {
        let key = CacheKey::from_clause_text(text, heading);
        let hit = self.entries.read().await.get(&key).copied();
        let mut stats = self.stats.write().await;
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    pub async fn insert(&self, text: &str, heading: Option<&str>, function: ClauseFunction) {
        let key = CacheKey::from_clause_text(text, heading);
        self.entries.write().await.insert(key, function);
    }

    pub async fn stats(&self) -> CacheStats {
        *self.stats.read().await
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ClauseFunctionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_updates_stats() {
        let cache = ClauseFunctionCache::new();
        assert!(cache.get("Payment due in 30 days.", None).await.is_none());

        cache
            .insert("Payment due in 30 days.", None, ClauseFunction::Payment)
            .await;
        let hit = cache.get("Payment due in 30 days.", None).await;
        assert_eq!(hit, Some(ClauseFunction::Payment));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn key_is_sensitive_to_heading() {
        let a = CacheKey::from_clause_text("same text", Some("A"));
        let b = CacheKey::from_clause_text("same text", Some("B"));
        assert_ne!(a, b);
    }
}
