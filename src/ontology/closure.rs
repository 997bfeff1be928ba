//! Bounded memo for transitive-closure queries.
//!
//! The memo lives inside its `OntologyGraph`, so a reloaded graph always
//! starts with an empty memo. Once `capacity` entries are stored, new
//! closures are computed but no longer remembered.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::graph::{Relation, TermId};

/// Default number of (term, relation set) closures kept per graph
pub const DEFAULT_CLOSURE_CAPACITY: usize = 65_536;

type ClosureKey = (TermId, Vec<Relation>);

/// Canonical relation set: sorted, deduplicated
pub(crate) fn relation_key(relations: &[Relation]) -> Vec<Relation> {
    let mut key = relations.to_vec();
    key.sort();
    key.dedup();
    key
}

#[derive(Debug)]
pub(crate) struct ClosureCache {
    capacity: usize,
    entries: RwLock<HashMap<ClosureKey, Arc<BTreeSet<TermId>>>>,
}

impl ClosureCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// `relations` must already be canonical (see [`relation_key`])
    pub(crate) fn get(&self, term_id: &str, relations: &[Relation]) -> Option<Arc<BTreeSet<TermId>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(term_id.to_string(), relations.to_vec()))
            .cloned()
    }

    pub(crate) fn insert(
        &self,
        term_id: TermId,
        relations: Vec<Relation>,
        closure: Arc<BTreeSet<TermId>>,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            tracing::warn!(
                capacity = self.capacity,
                term = %term_id,
                "closure memo at capacity, not storing"
            );
            return;
        }
        entries.insert((term_id, relations), closure);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_key_is_canonical() {
        let a = relation_key(&[Relation::PartOf, Relation::IsA, Relation::IsA]);
        let b = relation_key(&[Relation::IsA, Relation::PartOf]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_capacity_bounds_entries() {
        let cache = ClosureCache::new(1);
        let closure = Arc::new(BTreeSet::from(["X:1".to_string()]));
        cache.insert("X:1".to_string(), vec![Relation::IsA], Arc::clone(&closure));
        cache.insert("X:2".to_string(), vec![Relation::IsA], closure);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("X:1", &[Relation::IsA]).is_some());
        assert!(cache.get("X:2", &[Relation::IsA]).is_none());
    }
}
