//! Post-processing of pipeline results into the per-sample output record.
//!
//! Raw matches are filtered (exception terms, terms no loaded ontology
//! lists as mappable), named, ordered by attribute and span, and expanded
//! into their supertype closure. The same record feeds the sample-type
//! classifier through [`ClassifierFeatures`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::MapperConfig;
use crate::input::Sample;
use crate::ontology::{OntologySet, Relation, TermId};
use crate::pipeline::{MatchCandidate, MatchMethod, PipelineResult, RealValueCandidate};
use crate::text::{normalize_key, normalize_label, word_spans};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One mapped ontology term with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedTerm {
    pub term_id: TermId,
    pub term_name: String,
    pub origin_key: String,
    pub matched_span: MatchedSpan,
    pub match_method: MatchMethod,
    pub is_consequent: bool,
    pub path_to_mapping: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealValueProperty {
    pub property_id: TermId,
    pub unit_id: Option<TermId>,
    pub value: f64,
    pub original_key: String,
    pub consequent: bool,
    pub path_to_mapping: Vec<String>,
}

impl From<RealValueCandidate> for RealValueProperty {
    fn from(rv: RealValueCandidate) -> Self {
        Self {
            property_id: rv.property_id,
            unit_id: rv.unit_id,
            value: rv.value,
            original_key: rv.original_key,
            consequent: rv.consequent,
            path_to_mapping: rv.path_to_mapping,
        }
    }
}

/// Serialized result for one sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    #[serde(rename = "mapped ontology terms")]
    pub mapped_terms: Vec<MappedTerm>,

    #[serde(rename = "real-value properties")]
    pub real_value_properties: Vec<RealValueProperty>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,

    /// Sorted ids of every mapped term and its ancestors
    #[serde(rename = "supertype closure", default)]
    pub supertype_closure: Vec<TermId>,

    /// Set when the sample's pipeline run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl SampleOutput {
    /// Empty record for a sample whose run failed
    pub fn failed(accession: Option<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            accession,
            diagnostic: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.diagnostic.is_some()
    }

    pub fn term_ids(&self) -> BTreeSet<&str> {
        self.mapped_terms.iter().map(|t| t.term_id.as_str()).collect()
    }
}

/// Turns raw pipeline results into [`SampleOutput`] records
#[derive(Debug, Clone)]
pub struct PostProcessor {
    exception_term_ids: BTreeSet<TermId>,
    closure_relations: Vec<Relation>,
}

impl PostProcessor {
    pub fn new(exception_term_ids: impl IntoIterator<Item = TermId>, closure_relations: Vec<Relation>) -> Self {
        Self {
            exception_term_ids: exception_term_ids.into_iter().collect(),
            closure_relations,
        }
    }

    pub fn from_config(config: &MapperConfig) -> Self {
        Self::new(
            config.exception_term_ids.iter().cloned(),
            config.pipeline.closure_relations.clone(),
        )
    }

    pub fn process(&self, result: PipelineResult, ontologies: &OntologySet) -> SampleOutput {
        let PipelineResult {
            accession,
            attributes,
            matches,
            real_values,
        } = result;

        let position = |key: &str| {
            attributes
                .iter()
                .position(|a| a.key == key)
                .unwrap_or(attributes.len())
        };

        let mut kept: Vec<(MatchCandidate, String)> = matches
            .into_iter()
            .filter(|m| !self.exception_term_ids.contains(&m.term_id))
            .filter_map(|m| {
                let name = mappable_name(ontologies, &m.term_id)?;
                Some((m, name.to_string()))
            })
            .collect();
        kept.sort_by(|(a, _), (b, _)| {
            (position(&a.origin_key), a.start, a.end, &a.term_id)
                .cmp(&(position(&b.origin_key), b.start, b.end, &b.term_id))
        });

        let mut closure: BTreeSet<TermId> = BTreeSet::new();
        for (m, _) in &kept {
            closure.extend(
                ontologies.recursive_relationship(&m.term_id, &self.closure_relations),
            );
        }

        let mapped_terms = kept
            .into_iter()
            .map(|(m, term_name)| MappedTerm {
                term_id: m.term_id,
                term_name,
                origin_key: m.origin_key,
                matched_span: MatchedSpan {
                    start: m.start,
                    end: m.end,
                    text: m.matched_text,
                },
                match_method: m.method,
                is_consequent: m.is_consequent,
                path_to_mapping: m.path_to_mapping,
            })
            .collect();

        SampleOutput {
            mapped_terms,
            real_value_properties: real_values.into_iter().map(RealValueProperty::from).collect(),
            accession,
            supertype_closure: closure.into_iter().collect(),
            diagnostic: None,
        }
    }
}

/// Name from the first ontology listing the term as mappable
fn mappable_name<'a>(ontologies: &'a OntologySet, term_id: &str) -> Option<&'a str> {
    let graph = ontologies.graphs().iter().find(|g| g.is_mappable(term_id));
    match graph {
        Some(g) => g.name(term_id),
        None => {
            tracing::debug!(term = %term_id, "term not mappable in any ontology, dropped");
            None
        }
    }
}

// =============================================================================
// Classifier hand-off
// =============================================================================

/// A real-value property reduced to what the classifier reads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedRealValue {
    pub property_id: TermId,
    pub unit_id: Option<TermId>,
    pub value: f64,
}

/// Feature input for a sample-type classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifierFeatures {
    /// Mapped terms plus their supertype closure
    pub term_ids: BTreeSet<TermId>,
    pub real_values: Vec<TypedRealValue>,
    /// Unigrams and bigrams of the normalized keys and values
    pub ngrams: BTreeSet<String>,
}

impl ClassifierFeatures {
    pub fn new(output: &SampleOutput, sample: &Sample) -> Self {
        let mut term_ids: BTreeSet<TermId> = output.supertype_closure.iter().cloned().collect();
        term_ids.extend(output.mapped_terms.iter().map(|t| t.term_id.clone()));

        let real_values = output
            .real_value_properties
            .iter()
            .map(|rv| TypedRealValue {
                property_id: rv.property_id.clone(),
                unit_id: rv.unit_id.clone(),
                value: rv.value,
            })
            .collect();

        let mut ngrams = BTreeSet::new();
        for (key, value) in &sample.attributes {
            add_ngrams(&normalize_key(key), &mut ngrams);
            add_ngrams(&normalize_label(value), &mut ngrams);
        }

        Self {
            term_ids,
            real_values,
            ngrams,
        }
    }
}

fn add_ngrams(text: &str, out: &mut BTreeSet<String>) {
    let words: Vec<&str> = word_spans(text).into_iter().map(|(s, e)| &text[s..e]).collect();
    for (i, word) in words.iter().enumerate() {
        out.insert(word.to_string());
        if let Some(next) = words.get(i + 1) {
            out.insert(format!("{} {}", word, next));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

/// A pretrained sample-type classifier (e.g. cell line, tissue, primary cells)
pub trait SampleTypeClassifier: Send + Sync {
    fn predict(&self, features: &ClassifierFeatures) -> Prediction;
}
