//! The collection of loaded ontologies, in priority order.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::graph::{OntologyGraph, Relation, TermId};
use super::loader::graphs_from_bundle_yaml;
use crate::error::OntologyError;

/// Read-only set of ontology graphs shared by every pipeline run.
///
/// Order matters: the first graph containing a term answers name lookups,
/// and earlier graphs win ties during match priority filtering.
#[derive(Debug, Clone, Default)]
pub struct OntologySet {
    graphs: Vec<Arc<OntologyGraph>>,
}

impl OntologySet {
    pub fn new(graphs: Vec<OntologyGraph>) -> Self {
        Self {
            graphs: graphs.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_bundle_yaml(yaml: &str) -> Result<Self, OntologyError> {
        Ok(Self::new(graphs_from_bundle_yaml(yaml)?))
    }

    pub fn push(&mut self, graph: OntologyGraph) {
        self.graphs.push(Arc::new(graph));
    }

    pub fn graphs(&self) -> &[Arc<OntologyGraph>] {
        &self.graphs
    }

    pub fn get(&self, ontology_id: &str) -> Option<&OntologyGraph> {
        self.graphs
            .iter()
            .find(|g| g.id() == ontology_id)
            .map(|g| g.as_ref())
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn contains(&self, term_id: &str) -> bool {
        self.graphs.iter().any(|g| g.contains(term_id))
    }

    /// First graph (in priority order) that defines the term
    pub fn graph_for(&self, term_id: &str) -> Option<&OntologyGraph> {
        self.graphs
            .iter()
            .find(|g| g.contains(term_id))
            .map(|g| g.as_ref())
    }

    /// Priority rank of the term's ontology; lower is preferred
    pub fn rank(&self, term_id: &str) -> usize {
        self.graphs
            .iter()
            .position(|g| g.contains(term_id))
            .unwrap_or(self.graphs.len())
    }

    pub fn name(&self, term_id: &str) -> Option<&str> {
        self.graph_for(term_id).and_then(|g| g.name(term_id))
    }

    /// True if any loaded ontology lists the term as mappable
    pub fn is_mappable(&self, term_id: &str) -> bool {
        self.graphs.iter().any(|g| g.is_mappable(term_id))
    }

    /// Direct targets of one relation type, across every graph
    pub fn related(&self, term_id: &str, relation: &Relation) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for graph in &self.graphs {
            for target in graph.related(term_id, relation) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Union of per-graph closures
    pub fn recursive_relationship(&self, term_id: &str, relations: &[Relation]) -> BTreeSet<TermId> {
        let mut closure = BTreeSet::new();
        for graph in &self.graphs {
            closure.extend(graph.recursive_relationship(term_id, relations));
        }
        closure
    }

    /// Supertype closure over `is_a` and `part_of`
    pub fn ancestors(&self, term_id: &str) -> BTreeSet<TermId> {
        self.recursive_relationship(term_id, &Relation::hierarchical())
    }

    /// True if `ancestor` is reachable from `descendant` via `is_a`/`part_of`
    /// and is not the same term
    pub fn is_strict_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let hierarchical = Relation::hierarchical();
        ancestor != descendant
            && self
                .graphs
                .iter()
                .any(|g| g.reaches(descendant, ancestor, &hierarchical))
    }

    /// Mappable terms carrying the normalized label, restricted to the given
    /// ontologies when `ontology_ids` is non-empty
    pub fn lookup_label(&self, label_norm: &str, ontology_ids: &[String]) -> Vec<&str> {
        let mut hits: Vec<&str> = Vec::new();
        for graph in &self.graphs {
            if !ontology_ids.is_empty() && !ontology_ids.iter().any(|id| id == graph.id()) {
                continue;
            }
            for term_id in graph.lookup_label(label_norm) {
                if !hits.contains(&term_id.as_str()) {
                    hits.push(term_id.as_str());
                }
            }
        }
        hits
    }

    /// Combined fingerprint of every graph, in order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for graph in &self.graphs {
            hasher.update(graph.fingerprint().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Term;

    fn make_test_set() -> OntologySet {
        let cl = OntologyGraph::new(
            "CL",
            vec![
                Term::new("CL:0000000", "cell"),
                Term::new("CL:0000084", "T cell").is_a("CL:0000000"),
            ],
        )
        .unwrap();
        let efo = OntologyGraph::new(
            "EFO",
            vec![
                Term::new("EFO:0000322", "cell line"),
                // EFO re-declares the CL term with an extra parent
                Term::new("CL:0000084", "T cell").is_a("EFO:0000001"),
                Term::new("EFO:0000001", "experimental factor"),
            ],
        )
        .unwrap();
        OntologySet::new(vec![cl, efo])
    }

    #[test]
    fn test_closure_unions_graphs() {
        let set = make_test_set();
        let closure = set.ancestors("CL:0000084");
        assert!(closure.contains("CL:0000000"));
        assert!(closure.contains("EFO:0000001"));
        assert!(closure.contains("CL:0000084"));
    }

    #[test]
    fn test_lookup_label_restricted_to_ontologies() {
        let set = make_test_set();
        assert_eq!(set.lookup_label("t cell", &[]), vec!["CL:0000084"]);
        assert!(set.lookup_label("cell line", &["CL".to_string()]).is_empty());
        assert_eq!(
            set.lookup_label("cell line", &["EFO".to_string()]),
            vec!["EFO:0000322"]
        );
    }

    #[test]
    fn test_rank_and_name() {
        let set = make_test_set();
        assert_eq!(set.rank("CL:0000084"), 0);
        assert_eq!(set.rank("EFO:0000322"), 1);
        assert_eq!(set.rank("DOID:4"), 2);
        assert_eq!(set.name("EFO:0000322"), Some("cell line"));
        assert_eq!(set.name("DOID:4"), None);
    }

    #[test]
    fn test_strict_ancestor() {
        let set = make_test_set();
        assert!(set.is_strict_ancestor("CL:0000000", "CL:0000084"));
        assert!(!set.is_strict_ancestor("CL:0000084", "CL:0000084"));
        assert!(!set.is_strict_ancestor("CL:0000084", "CL:0000000"));
    }
}
