//! Ontology graph abstraction queried by the matching stages.

mod closure;
pub mod graph;
pub mod loader;
pub mod set;

pub use closure::DEFAULT_CLOSURE_CAPACITY;
pub use graph::{OntologyGraph, Relation, Term, TermId};
pub use loader::{OntologyBundle, OntologyFile, TermRecord};
pub use set::OntologySet;
