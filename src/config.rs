//! Mapper configuration types
//!
//! Defines the serde schema for `config/pipeline.yaml` and for the keyword
//! override files operators inject before a batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::ontology::Relation;
use crate::resources::MappingDirective;

const DEFAULT_CONFIG: &str = include_str!("../config/pipeline.yaml");

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Term IDs removed from every output (too generic to be useful)
    #[serde(default = "default_exception_term_ids")]
    pub exception_term_ids: Vec<String>,

    /// Number of contiguous shards processed in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Static parameters of the standard stage sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_ngram_max_len")]
    pub ngram_max_len: usize,

    #[serde(default = "default_delimiters")]
    pub delimiters: Vec<char>,

    #[serde(default = "default_exact_ontology_ids")]
    pub exact_ontology_ids: Vec<String>,

    #[serde(default = "default_query_len_thresh")]
    pub exact_query_len_thresh: usize,

    #[serde(default = "default_fuzzy_distance_threshold")]
    pub fuzzy_distance_threshold: f64,

    #[serde(default = "default_query_len_thresh")]
    pub fuzzy_query_len_thresh: usize,

    #[serde(default = "default_closure_relations")]
    pub closure_relations: Vec<Relation>,
}

fn default_exception_term_ids() -> Vec<String> {
    ["EFO:0000322", "DOID:4", "EFO:0000727", "EFO:0000408", "Orphanet:377788"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_workers() -> usize {
    1
}

fn default_ngram_max_len() -> usize {
    5
}

fn default_delimiters() -> Vec<char> {
    vec!['+', '_', '-', '/']
}

fn default_exact_ontology_ids() -> Vec<String> {
    ["CL", "UBERON", "DOID", "EFO", "CVCL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_query_len_thresh() -> usize {
    3
}

fn default_fuzzy_distance_threshold() -> f64 {
    0.1
}

fn default_closure_relations() -> Vec<Relation> {
    Relation::hierarchical().to_vec()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ngram_max_len: default_ngram_max_len(),
            delimiters: default_delimiters(),
            exact_ontology_ids: default_exact_ontology_ids(),
            exact_query_len_thresh: default_query_len_thresh(),
            fuzzy_distance_threshold: default_fuzzy_distance_threshold(),
            fuzzy_query_len_thresh: default_query_len_thresh(),
            closure_relations: default_closure_relations(),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            exception_term_ids: default_exception_term_ids(),
            workers: default_workers(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ngram_max_len == 0 {
            return Err(invalid("NGram", "ngram_max_len must be at least 1"));
        }
        if !(self.fuzzy_distance_threshold > 0.0 && self.fuzzy_distance_threshold < 1.0) {
            return Err(invalid(
                "FuzzyStringMatching",
                format!(
                    "fuzzy_distance_threshold must be in (0, 1), got {}",
                    self.fuzzy_distance_threshold
                ),
            ));
        }
        if self.delimiters.iter().any(|c| c.is_whitespace()) {
            return Err(invalid("Delimit", "delimiters must not be whitespace"));
        }
        if self.closure_relations.is_empty() {
            return Err(invalid(
                "SupertypeClosure",
                "closure_relations must name at least one relation",
            ));
        }
        Ok(())
    }
}

impl MapperConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: MapperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration shipped in `config/pipeline.yaml`
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(DEFAULT_CONFIG)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        if self.workers == 0 {
            return Err(invalid("Driver", "workers must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(stage: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        stage: stage.to_string(),
        reason: reason.into(),
    }
}

/// Operator-supplied keyword → term directives.
///
/// ```json
/// { "hela s3": ["CVCL_0058"], "healthy": [{ "term_id": "PATO:0000461" }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordOverrides {
    entries: BTreeMap<String, Vec<MappingDirective>>,
}

impl KeywordOverrides {
    pub fn new(entries: BTreeMap<String, Vec<MappingDirective>>) -> Result<Self, ConfigError> {
        let overrides = Self { entries };
        overrides.validate()?;
        Ok(overrides)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: BTreeMap<String, Vec<MappingDirective>> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[MappingDirective])> {
        self.entries
            .iter()
            .map(|(keyword, directives)| (keyword.as_str(), directives.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (keyword, directives) in &self.entries {
            let reject = |reason: &str| ConfigError::InvalidKeywordOverride {
                keyword: keyword.clone(),
                reason: reason.to_string(),
            };
            if keyword.trim().is_empty() {
                return Err(reject("keyword is empty"));
            }
            if directives.is_empty() {
                return Err(reject("no term directives given"));
            }
            if directives.iter().any(|d| d.term_id().trim().is_empty()) {
                return Err(reject("directive has an empty term_id"));
            }
        }
        Ok(())
    }
}
