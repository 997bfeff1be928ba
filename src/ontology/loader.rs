//! Ontology interchange format.
//!
//! Graph construction from upstream OBO/OWL releases happens elsewhere; this
//! loader reads the flattened form those tools emit:
//!
//! ```yaml
//! id: CL
//! terms:
//!   - id: "CL:0000084"
//!     name: T cell
//!     synonyms: [T lymphocyte]
//!     is_a: ["CL:0000542"]
//!     part_of: []
//!     relationships: { has_disease: [] }
//!     obsolete: false
//! ```
//!
//! A bundle (`ontologies: [...]`) holds several ontologies in one file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::graph::{OntologyGraph, Relation, Term};
use crate::error::OntologyError;

#[derive(Debug, Clone, Deserialize)]
pub struct OntologyFile {
    pub id: String,
    #[serde(default)]
    pub terms: Vec<TermRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OntologyBundle {
    pub ontologies: Vec<OntologyFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub is_a: Vec<String>,
    #[serde(default)]
    pub part_of: Vec<String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub obsolete: bool,
}

impl From<TermRecord> for Term {
    fn from(record: TermRecord) -> Self {
        let mut term = Term::new(record.id, record.name);
        term.synonyms.extend(record.synonyms);
        for parent in record.is_a {
            term = term.is_a(parent);
        }
        for whole in record.part_of {
            term = term.part_of(whole);
        }
        for (relation, targets) in record.relationships {
            let relation = Relation::from(relation);
            for target in targets {
                term = term.with_relation(relation.clone(), target);
            }
        }
        if record.obsolete {
            term = term.unmappable();
        }
        term
    }
}

impl OntologyFile {
    pub fn into_graph(self) -> Result<OntologyGraph, OntologyError> {
        let terms = self.terms.into_iter().map(Term::from).collect();
        OntologyGraph::new(self.id, terms)
    }
}

impl OntologyGraph {
    /// Load a single ontology from a YAML or JSON file (by extension).
    pub fn load(path: &Path) -> Result<Self, OntologyError> {
        let content = read(path)?;
        let file: OntologyFile = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        let graph = file.into_graph()?;
        tracing::info!(
            path = %path.display(),
            ontology = %graph.id(),
            terms = graph.len(),
            "loaded ontology"
        );
        Ok(graph)
    }

    /// Parse a single ontology from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, OntologyError> {
        let file: OntologyFile = serde_yaml::from_str(yaml)?;
        file.into_graph()
    }
}

/// Parse a bundle of ontologies from YAML
pub fn graphs_from_bundle_yaml(yaml: &str) -> Result<Vec<OntologyGraph>, OntologyError> {
    let bundle: OntologyBundle = serde_yaml::from_str(yaml)?;
    bundle
        .ontologies
        .into_iter()
        .map(OntologyFile::into_graph)
        .collect()
}

fn read(path: &Path) -> Result<String, OntologyError> {
    std::fs::read_to_string(path).map_err(|source| OntologyError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEST_YAML: &str = r#"
id: DOID
terms:
  - id: "DOID:4"
    name: disease
  - id: "DOID:162"
    name: cancer
    synonyms: [malignant neoplasm]
    is_a: ["DOID:4"]
  - id: "DOID:0000000"
    name: retired disease
    obsolete: true
"#;

    #[test]
    fn test_load_from_yaml() {
        let graph = OntologyGraph::from_yaml(TEST_YAML).unwrap();
        assert_eq!(graph.id(), "DOID");
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.name("DOID:162"), Some("cancer"));
        assert!(graph.synonyms("DOID:162").contains("malignant neoplasm"));
        assert!(!graph.is_mappable("DOID:0000000"));
    }

    #[test]
    fn test_custom_relationships() {
        let yaml = r#"
id: CVCL
terms:
  - id: CVCL_0030
    name: HeLa
    relationships:
      has_disease: ["DOID:4362"]
"#;
        let graph = OntologyGraph::from_yaml(yaml).unwrap();
        assert_eq!(
            graph.related("CVCL_0030", &Relation::from("has_disease")),
            vec!["DOID:4362"]
        );
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"id": "UBERON", "terms": [{{"id": "UBERON:0000178", "name": "blood"}}]}}"#
        )
        .unwrap();

        let graph = OntologyGraph::load(file.path()).unwrap();
        assert_eq!(graph.id(), "UBERON");
        assert!(graph.contains("UBERON:0000178"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = OntologyGraph::load(Path::new("/nonexistent/ontology.yaml")).unwrap_err();
        assert!(matches!(err, OntologyError::Io { .. }));
    }

    #[test]
    fn test_bundle() {
        let yaml = r#"
ontologies:
  - id: CL
    terms:
      - id: "CL:0000000"
        name: cell
  - id: UBERON
    terms:
      - id: "UBERON:0000178"
        name: blood
"#;
        let graphs = graphs_from_bundle_yaml(yaml).unwrap();
        assert_eq!(graphs.len(), 2);
        assert_eq!(graphs[1].id(), "UBERON");
    }

    #[test]
    fn test_fixture_bundle_loads() {
        let graphs = graphs_from_bundle_yaml(include_str!("../../tests/fixtures/ontology.yaml")).unwrap();
        let ids: Vec<&str> = graphs.iter().map(|g| g.id()).collect();
        assert_eq!(ids, vec!["CL", "UBERON", "DOID", "EFO", "CVCL", "PATO"]);
        assert!(!graphs[0].is_mappable("CL:0000999"));
        assert_eq!(graphs[0].lookup_label("t lymphocyte"), ["CL:0000084".to_string()]);
    }
}
