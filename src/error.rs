//! Error types for the sample mapping system
//!
//! Configuration and ontology errors are fatal and surface before a batch
//! starts. Stage and pipeline errors are per-sample: the driver turns them
//! into an empty result with a diagnostic instead of aborting the batch.

use thiserror::Error;

/// Top-level error type for the library
#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Ontology error: {0}")]
    Ontology(#[from] OntologyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while building or loading an ontology graph
#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("Failed to read ontology file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid ontology YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid ontology JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Term '{term_id}' is defined more than once in ontology '{ontology_id}'")]
    DuplicateTerm {
        ontology_id: String,
        term_id: String,
    },

    #[error("Relation '{relation}' forms a cycle through term '{term_id}'")]
    Cycle { relation: String, term_id: String },

}

/// Configuration errors (fatal at batch start)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid keyword override '{keyword}': {reason}")]
    InvalidKeywordOverride { keyword: String, reason: String },

    #[error("Invalid parameter for {stage}: {reason}")]
    InvalidParameter { stage: String, reason: String },

    #[error("No ontologies loaded")]
    NoOntologies,

    #[error("Ontology '{0}' is configured for matching but not loaded")]
    UnknownOntology(String),
}

/// Errors raised by a single stage while transforming a sample's state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("Span {start}..{end} is out of bounds for value of key '{key}'")]
    InvalidSpan {
        key: String,
        start: usize,
        end: usize,
    },

    #[error("Invariant violated in {stage}: {detail}")]
    Invariant { stage: &'static str, detail: String },
}

/// Errors raised while running the pipeline over one sample
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("Pipeline panicked: {detail}")]
    Panicked { detail: String },
}

pub type Result<T> = std::result::Result<T, MapperError>;
