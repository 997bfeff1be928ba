//! Biosample attribute mapping.
//!
//! Maps free-text sample metadata (`"cell type": "CD4+ T cell"`) onto
//! ontology terms and extracts real-valued properties (`"age": "21 years"`),
//! with the provenance of every mapping.
//!
//! ```no_run
//! use std::sync::Arc;
//! use biosample_mapper::{Driver, MapperConfig, OntologySet, Resources, Sample};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ontologies = OntologySet::from_bundle_yaml(&std::fs::read_to_string("ontologies.yaml")?)?;
//! let driver = Driver::from_config(
//!     &MapperConfig::builtin()?,
//!     Arc::new(ontologies),
//!     Resources::builtin()?,
//!     None,
//! )?;
//! let batch = driver.run(&[Sample::new(Some("SAMN1"), [("cell type", "CD4+ T cell")])]);
//! println!("{}", serde_json::to_string_pretty(&batch.outputs)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod ontology;
pub mod output;
pub mod pipeline;
pub mod resources;
pub mod stages;
pub mod text;

pub use config::{KeywordOverrides, MapperConfig, PipelineConfig};
pub use driver::{BatchOutput, BatchReport, Driver};
pub use error::{ConfigError, MapperError, OntologyError, PipelineError, Result, StageError};
pub use input::Sample;
pub use ontology::{OntologyGraph, OntologySet, Relation, Term, TermId};
pub use output::{ClassifierFeatures, MappedTerm, PostProcessor, Prediction, SampleOutput, SampleTypeClassifier};
pub use pipeline::{MappingState, MatchCandidate, MatchMethod, Pipeline, QueryCache, RealValueCandidate, Stage};
pub use resources::Resources;
