//! In-memory ontology graph: terms, synonyms, typed edges and closure queries.
//!
//! A graph is built once from static ontology data and never mutated
//! afterwards. All lookups are pure; unknown term IDs produce `None` or an
//! empty set rather than an error, so stages can treat them as "no match".

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use super::closure::{relation_key, ClosureCache, DEFAULT_CLOSURE_CAPACITY};
use crate::error::OntologyError;
use crate::text::{char_len, normalize_label};

/// Type alias for term identifiers (e.g., "CL:0000084", "CVCL_0030")
pub type TermId = String;

static NO_SYNONYMS: BTreeSet<String> = BTreeSet::new();

/// Typed edge between two terms
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Relation {
    IsA,
    PartOf,
    Other(String),
}

impl Relation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::IsA => "is_a",
            Self::PartOf => "part_of",
            Self::Other(name) => name,
        }
    }

    /// The relations used for supertype closure
    pub fn hierarchical() -> [Relation; 2] {
        [Relation::IsA, Relation::PartOf]
    }
}

impl From<&str> for Relation {
    fn from(s: &str) -> Self {
        match s {
            "is_a" => Self::IsA,
            "part_of" => Self::PartOf,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Relation {
    fn from(s: String) -> Self {
        Relation::from(s.as_str())
    }
}

impl From<Relation> for String {
    fn from(r: Relation) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ontology term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,

    /// Canonical name
    pub name: String,

    /// Synonym strings (original casing)
    #[serde(default)]
    pub synonyms: BTreeSet<String>,

    /// Outgoing typed edges: relation → target term IDs
    #[serde(default)]
    pub relations: BTreeMap<Relation, BTreeSet<TermId>>,

    /// Whether the term may appear in output (false for obsolete terms)
    #[serde(default = "default_mappable")]
    pub mappable: bool,
}

fn default_mappable() -> bool {
    true
}

impl Term {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            synonyms: BTreeSet::new(),
            relations: BTreeMap::new(),
            mappable: true,
        }
    }

    pub fn with_synonym(mut self, synonym: impl Into<String>) -> Self {
        self.synonyms.insert(synonym.into());
        self
    }

    pub fn with_relation(mut self, relation: Relation, target: impl Into<String>) -> Self {
        self.relations
            .entry(relation)
            .or_default()
            .insert(target.into());
        self
    }

    pub fn is_a(self, parent: impl Into<String>) -> Self {
        self.with_relation(Relation::IsA, parent)
    }

    pub fn part_of(self, whole: impl Into<String>) -> Self {
        self.with_relation(Relation::PartOf, whole)
    }

    pub fn unmappable(mut self) -> Self {
        self.mappable = false;
        self
    }

    /// Name followed by synonyms
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(|s| s.as_str()))
    }
}

/// Immutable index over one ontology
#[derive(Debug)]
pub struct OntologyGraph {
    /// Ontology identifier (e.g., "CL", "DOID")
    id: String,

    /// Content hash of all terms, used to tie caches to graph identity
    fingerprint: String,

    terms: HashMap<TermId, Term>,

    /// Normalized label → mappable term IDs carrying that name or synonym.
    /// Bounded inline to 4 terms per label.
    label_index: HashMap<String, SmallVec<[TermId; 4]>>,

    /// Character length → (normalized label, term ID); used by fuzzy matching
    labels_by_len: BTreeMap<usize, Vec<(String, TermId)>>,

    closure: ClosureCache,
}

impl OntologyGraph {
    /// Build a graph from terms.
    ///
    /// Rejects duplicate term IDs and cycles within any relation type.
    pub fn new(id: impl Into<String>, terms: Vec<Term>) -> Result<Self, OntologyError> {
        Self::with_closure_capacity(id, terms, DEFAULT_CLOSURE_CAPACITY)
    }

    pub fn with_closure_capacity(
        id: impl Into<String>,
        terms: Vec<Term>,
        closure_capacity: usize,
    ) -> Result<Self, OntologyError> {
        let id = id.into();
        let mut by_id: HashMap<TermId, Term> = HashMap::with_capacity(terms.len());
        for term in terms {
            if by_id.contains_key(&term.id) {
                return Err(OntologyError::DuplicateTerm {
                    ontology_id: id,
                    term_id: term.id,
                });
            }
            by_id.insert(term.id.clone(), term);
        }

        let relations: BTreeSet<&Relation> = by_id
            .values()
            .flat_map(|t| t.relations.keys())
            .collect();
        for relation in relations {
            if let Some(term_id) = find_cycle(&by_id, relation) {
                return Err(OntologyError::Cycle {
                    relation: relation.to_string(),
                    term_id,
                });
            }
        }

        let mut label_index: HashMap<String, SmallVec<[TermId; 4]>> = HashMap::new();
        let mut labels_by_len: BTreeMap<usize, Vec<(String, TermId)>> = BTreeMap::new();
        let mut sorted_ids: Vec<&TermId> = by_id.keys().collect();
        sorted_ids.sort();
        for term_id in &sorted_ids {
            let term = &by_id[*term_id];
            if !term.mappable {
                continue;
            }
            for label in term.labels() {
                let norm = normalize_label(label);
                if norm.is_empty() {
                    continue;
                }
                let ids = label_index.entry(norm.clone()).or_default();
                if ids.contains(&term.id) {
                    continue;
                }
                ids.push(term.id.clone());
                labels_by_len
                    .entry(char_len(&norm))
                    .or_default()
                    .push((norm, term.id.clone()));
            }
        }

        let fingerprint = compute_fingerprint(&id, &sorted_ids, &by_id);

        tracing::debug!(
            ontology = %id,
            terms = by_id.len(),
            labels = label_index.len(),
            "built ontology graph"
        );

        Ok(Self {
            id,
            fingerprint,
            terms: by_id,
            label_index,
            labels_by_len,
            closure: ClosureCache::new(closure_capacity),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term_id: &str) -> bool {
        self.terms.contains_key(term_id)
    }

    pub fn term(&self, term_id: &str) -> Option<&Term> {
        self.terms.get(term_id)
    }

    pub fn is_mappable(&self, term_id: &str) -> bool {
        self.terms.get(term_id).map(|t| t.mappable).unwrap_or(false)
    }

    pub fn name(&self, term_id: &str) -> Option<&str> {
        self.terms.get(term_id).map(|t| t.name.as_str())
    }

    /// Synonyms of a term; empty for unknown IDs
    pub fn synonyms(&self, term_id: &str) -> &BTreeSet<String> {
        self.terms
            .get(term_id)
            .map(|t| &t.synonyms)
            .unwrap_or(&NO_SYNONYMS)
    }

    /// Direct (non-transitive) targets of one relation type
    pub fn related(&self, term_id: &str, relation: &Relation) -> Vec<&str> {
        self.terms
            .get(term_id)
            .and_then(|t| t.relations.get(relation))
            .map(|targets| targets.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn mappable_term_ids(&self) -> impl Iterator<Item = &str> {
        self.terms
            .values()
            .filter(|t| t.mappable)
            .map(|t| t.id.as_str())
    }

    /// Mappable terms whose name or synonym normalizes to `label_norm`
    pub fn lookup_label(&self, label_norm: &str) -> &[TermId] {
        self.label_index
            .get(label_norm)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Normalized labels whose character length falls in `lengths`
    pub fn labels_in_len_range(
        &self,
        lengths: RangeInclusive<usize>,
    ) -> impl Iterator<Item = (&str, &str)> {
        self.labels_by_len
            .range(lengths)
            .flat_map(|(_, labels)| labels.iter())
            .map(|(label, id)| (label.as_str(), id.as_str()))
    }

    /// Transitive closure of `term_id` over the given relation types.
    ///
    /// The closure is reflexive: a known term is part of its own closure.
    /// Edges pointing outside this graph are included but not expanded.
    /// Unknown terms return an empty set. Results are memoized per
    /// (term, relation set) for the lifetime of the graph.
    pub fn recursive_relationship(
        &self,
        term_id: &str,
        relations: &[Relation],
    ) -> BTreeSet<TermId> {
        self.shared_closure(term_id, relations)
            .map(|closure| closure.as_ref().clone())
            .unwrap_or_default()
    }

    /// True if `target` is in the closure of `term_id`
    pub fn reaches(&self, term_id: &str, target: &str, relations: &[Relation]) -> bool {
        self.shared_closure(term_id, relations)
            .is_some_and(|closure| closure.contains(target))
    }

    /// Memoized closure without copying; `None` for unknown terms
    fn shared_closure(&self, term_id: &str, relations: &[Relation]) -> Option<Arc<BTreeSet<TermId>>> {
        if !self.contains(term_id) {
            return None;
        }

        let relations = relation_key(relations);
        if let Some(hit) = self.closure.get(term_id, &relations) {
            return Some(hit);
        }

        let mut closure: BTreeSet<TermId> = BTreeSet::new();
        let mut stack: Vec<&str> = vec![term_id];
        while let Some(current) = stack.pop() {
            if !closure.insert(current.to_string()) {
                continue;
            }
            let Some(term) = self.terms.get(current) else {
                continue;
            };
            for relation in &relations {
                if let Some(targets) = term.relations.get(relation) {
                    stack.extend(
                        targets
                            .iter()
                            .filter(|t| !closure.contains(*t))
                            .map(|t| t.as_str()),
                    );
                }
            }
        }

        let closure = Arc::new(closure);
        self.closure
            .insert(term_id.to_string(), relations, Arc::clone(&closure));
        Some(closure)
    }

    /// Number of memoized closures (for diagnostics)
    pub fn memoized_closures(&self) -> usize {
        self.closure.len()
    }
}

fn compute_fingerprint(id: &str, sorted_ids: &[&TermId], terms: &HashMap<TermId, Term>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    for term_id in sorted_ids {
        let term = &terms[*term_id];
        hasher.update(term.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(term.name.as_bytes());
        for synonym in &term.synonyms {
            hasher.update([1u8]);
            hasher.update(synonym.as_bytes());
        }
        for (relation, targets) in &term.relations {
            hasher.update([2u8]);
            hasher.update(relation.as_str().as_bytes());
            for target in targets {
                hasher.update([3u8]);
                hasher.update(target.as_bytes());
            }
        }
        hasher.update([u8::from(term.mappable)]);
    }
    hex::encode(hasher.finalize())
}

/// Depth-first search for a cycle along one relation type.
///
/// Returns a term on the cycle, or `None` if the relation is acyclic.
fn find_cycle(terms: &HashMap<TermId, Term>, relation: &Relation) -> Option<TermId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut roots: Vec<&str> = terms.keys().map(|s| s.as_str()).collect();
    roots.sort_unstable();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for root in roots {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root, Mark::Visiting);
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(root, edge_targets(terms, relation, root))];

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(next) => match marks.get(next) {
                    Some(Mark::Visiting) => return Some(next.to_string()),
                    Some(Mark::Done) => {}
                    None => {
                        if terms.contains_key(next) {
                            marks.insert(next, Mark::Visiting);
                            stack.push((next, edge_targets(terms, relation, next)));
                        }
                    }
                },
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    None
}

fn edge_targets<'a>(
    terms: &'a HashMap<TermId, Term>,
    relation: &Relation,
    id: &str,
) -> Vec<&'a str> {
    terms
        .get(id)
        .and_then(|t| t.relations.get(relation))
        .map(|s| s.iter().map(|t| t.as_str()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_graph() -> OntologyGraph {
        OntologyGraph::new(
            "CL",
            vec![
                Term::new("CL:0000000", "cell"),
                Term::new("CL:0000542", "lymphocyte").is_a("CL:0000000"),
                Term::new("CL:0000084", "T cell")
                    .with_synonym("T lymphocyte")
                    .is_a("CL:0000542"),
                Term::new("CL:0000624", "CD4-positive, alpha-beta T cell")
                    .with_synonym("CD4+ T cell")
                    .is_a("CL:0000084"),
                Term::new("CL:0000099", "obsolete interneuron").unmappable(),
                Term::new("CL:0002092", "bone marrow cell")
                    .is_a("CL:0000000")
                    .part_of("UBERON:0002371"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name_and_synonym() {
        let graph = make_test_graph();
        assert_eq!(graph.lookup_label("t cell"), &["CL:0000084".to_string()]);
        assert_eq!(graph.lookup_label("t lymphocyte"), &["CL:0000084".to_string()]);
        assert_eq!(graph.lookup_label("cd4+ t cell"), &["CL:0000624".to_string()]);
        assert!(graph.lookup_label("b cell").is_empty());
    }

    #[test]
    fn test_unmappable_terms_are_not_indexed() {
        let graph = make_test_graph();
        assert!(graph.contains("CL:0000099"));
        assert!(!graph.is_mappable("CL:0000099"));
        assert!(graph.lookup_label("obsolete interneuron").is_empty());
    }

    #[test]
    fn test_unknown_term_is_not_found() {
        let graph = make_test_graph();
        assert!(!graph.contains("CL:9999999"));
        assert_eq!(graph.name("CL:9999999"), None);
        assert!(graph.synonyms("CL:9999999").is_empty());
        assert!(graph
            .recursive_relationship("CL:9999999", &Relation::hierarchical())
            .is_empty());
    }

    #[test]
    fn test_recursive_relationship_is_reflexive_and_transitive() {
        let graph = make_test_graph();
        let closure = graph.recursive_relationship("CL:0000624", &Relation::hierarchical());
        let expected: BTreeSet<TermId> = ["CL:0000624", "CL:0000084", "CL:0000542", "CL:0000000"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(closure, expected);
    }

    #[test]
    fn test_recursive_relationship_respects_relation_types() {
        let graph = make_test_graph();
        let is_a_only = graph.recursive_relationship("CL:0002092", &[Relation::IsA]);
        assert!(!is_a_only.contains("UBERON:0002371"));

        let both = graph.recursive_relationship("CL:0002092", &Relation::hierarchical());
        // Foreign targets are included but not expanded
        assert!(both.contains("UBERON:0002371"));
    }

    #[test]
    fn test_closure_is_memoized_per_relation_set() {
        let graph = make_test_graph();
        assert_eq!(graph.memoized_closures(), 0);
        graph.recursive_relationship("CL:0000084", &[Relation::IsA, Relation::PartOf]);
        graph.recursive_relationship("CL:0000084", &[Relation::PartOf, Relation::IsA]);
        assert_eq!(graph.memoized_closures(), 1);
        graph.recursive_relationship("CL:0000084", &[Relation::IsA]);
        assert_eq!(graph.memoized_closures(), 2);
    }

    #[test]
    fn test_reaches_shares_memoized_closure() {
        let graph = make_test_graph();
        let hierarchical = Relation::hierarchical();
        assert!(graph.reaches("CL:0000624", "CL:0000542", &hierarchical));
        assert!(graph.reaches("CL:0000624", "CL:0000624", &hierarchical));
        assert!(!graph.reaches("CL:0000542", "CL:0000624", &hierarchical));
        assert!(!graph.reaches("CL:9999999", "CL:0000000", &hierarchical));
        assert_eq!(graph.memoized_closures(), 2);

        let first = graph.shared_closure("CL:0000624", &hierarchical).unwrap();
        let second = graph.shared_closure("CL:0000624", &hierarchical).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_duplicate_term_rejected() {
        let err = OntologyGraph::new(
            "CL",
            vec![Term::new("CL:1", "a"), Term::new("CL:1", "b")],
        )
        .unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateTerm { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = OntologyGraph::new(
            "X",
            vec![
                Term::new("X:1", "a").is_a("X:2"),
                Term::new("X:2", "b").is_a("X:3"),
                Term::new("X:3", "c").is_a("X:1"),
            ],
        )
        .unwrap_err();
        match err {
            OntologyError::Cycle { relation, .. } => assert_eq!(relation, "is_a"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_cycle_across_relation_types_is_allowed() {
        // part_of one way and is_a the other way is not a cycle per relation
        let graph = OntologyGraph::new(
            "X",
            vec![
                Term::new("X:1", "a").is_a("X:2"),
                Term::new("X:2", "b").part_of("X:1"),
            ],
        );
        assert!(graph.is_ok());
    }

    #[test]
    fn test_fingerprint_depends_on_content() {
        let a = make_test_graph();
        let b = make_test_graph();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = OntologyGraph::new("CL", vec![Term::new("CL:0000000", "cell")]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_relation_string_round_trip() {
        assert_eq!(Relation::from("is_a"), Relation::IsA);
        assert_eq!(Relation::from("has_disease").as_str(), "has_disease");
        assert_eq!(String::from(Relation::PartOf), "part_of");
    }

    #[test]
    fn test_labels_in_len_range() {
        let graph = make_test_graph();
        let labels: Vec<&str> = graph.labels_in_len_range(6..=6).map(|(l, _)| l).collect();
        assert!(labels.contains(&"t cell"));
    }
}
