//! Cross-sample cache of per-attribute results.
//!
//! Entries are keyed on the raw `(key, value)` text and hold what the
//! attribute-scope stages produced for that pair. A cache is stamped with
//! the fingerprint of the pipeline that filled it; handing it to a pipeline
//! with a different fingerprint clears it first.

use std::collections::HashMap;
use std::sync::Arc;

use super::state::{Attribute, MatchCandidate, RealValueCandidate};

/// Result of the attribute-scope stages for one key/value pair
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFragment {
    /// `None` when the pair was filtered out
    pub attribute: Option<Attribute>,
    pub matches: Vec<MatchCandidate>,
    pub real_values: Vec<RealValueCandidate>,
}

/// Hit/miss counters for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn merge(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            entries: self.entries + other.entries,
        }
    }
}

/// Per-worker cache; not shared between threads
#[derive(Debug, Default)]
pub struct QueryCache {
    fingerprint: Option<String>,
    entries: HashMap<(String, String), Arc<AttributeFragment>>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of the pipeline whose results are stored
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Tie the cache to a pipeline, clearing entries made by another one
    pub(crate) fn bind(&mut self, fingerprint: &str) {
        match &self.fingerprint {
            Some(current) if current == fingerprint => {}
            Some(current) => {
                tracing::warn!(
                    previous = %current,
                    current = %fingerprint,
                    entries = self.entries.len(),
                    "query cache built by a different pipeline configuration, clearing"
                );
                self.entries.clear();
                self.fingerprint = Some(fingerprint.to_string());
            }
            None => {
                self.entries.clear();
                self.fingerprint = Some(fingerprint.to_string());
            }
        }
    }

    pub fn get(&mut self, key: &str, value: &str) -> Option<Arc<AttributeFragment>> {
        let hit = self
            .entries
            .get(&(key.to_string(), value.to_string()))
            .cloned();
        match hit {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        hit
    }

    pub fn insert(&mut self, key: &str, value: &str, fragment: Arc<AttributeFragment>) {
        self.entries
            .insert((key.to_string(), value.to_string()), fragment);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.fingerprint = None;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment() -> Arc<AttributeFragment> {
        Arc::new(AttributeFragment {
            attribute: Some(Attribute::new("tissue", "liver")),
            matches: vec![],
            real_values: vec![],
        })
    }

    #[test]
    fn test_hits_and_misses_counted() {
        let mut cache = QueryCache::new();
        cache.bind("abc");
        assert!(cache.get("tissue", "liver").is_none());
        cache.insert("tissue", "liver", fragment());
        assert!(cache.get("tissue", "liver").is_some());
        assert!(cache.get("Tissue", "liver").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 2, 1));
    }

    #[test]
    fn test_rebinding_to_other_fingerprint_clears() {
        let mut cache = QueryCache::new();
        cache.bind("abc");
        cache.insert("tissue", "liver", fragment());

        cache.bind("abc");
        assert_eq!(cache.len(), 1);

        cache.bind("def");
        assert!(cache.is_empty());
        assert_eq!(cache.fingerprint(), Some("def"));
    }
}
