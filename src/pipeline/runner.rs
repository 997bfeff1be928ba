//! Straight-line execution of a stage list over one sample.

use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::cache::{AttributeFragment, QueryCache};
use super::stage::{Stage, StageContext, StageScope};
use super::state::{Attribute, MappingState, MatchCandidate, RealValueCandidate};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::input::Sample;
use crate::ontology::OntologySet;
use crate::resources::Resources;

/// Raw pipeline output for one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    pub accession: Option<String>,
    /// Attributes that survived filtering, with their spans
    pub attributes: Vec<Attribute>,
    pub matches: Vec<MatchCandidate>,
    pub real_values: Vec<RealValueCandidate>,
}

/// An ordered, immutable stage sequence bound to its shared resources
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    ontologies: Arc<OntologySet>,
    resources: Arc<Resources>,
    /// Number of leading attribute-scope stages
    cacheable_prefix: usize,
    fingerprint: String,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, ontologies: Arc<OntologySet>, resources: Arc<Resources>) -> Self {
        let cacheable_prefix = stages
            .iter()
            .take_while(|s| s.scope() == StageScope::Attribute)
            .count();
        let fingerprint = compute_fingerprint(&stages, &ontologies, &resources);
        Self {
            stages,
            ontologies,
            resources,
            cacheable_prefix,
            fingerprint,
        }
    }

    /// The standard stage order, parameterized by `config`.
    ///
    /// Every ontology id named for matching must be loaded.
    pub fn standard(
        config: &PipelineConfig,
        ontologies: Arc<OntologySet>,
        resources: Arc<Resources>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if ontologies.is_empty() {
            return Err(ConfigError::NoOntologies);
        }
        if let Some(missing) = config
            .exact_ontology_ids
            .iter()
            .find(|id| ontologies.get(id).is_none())
        {
            return Err(ConfigError::UnknownOntology(missing.clone()));
        }
        Ok(Self::new(standard_stages(config), ontologies, resources))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn ontologies(&self) -> &OntologySet {
        &self.ontologies
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Hex SHA-256 identifying stages, resources and ontologies
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            ontologies: &self.ontologies,
            resources: &self.resources,
        }
    }

    /// Map one sample.
    ///
    /// The attribute-scope prefix runs once per distinct `(key, value)` pair
    /// and is served from `cache` afterwards; the remaining stages run on the
    /// merged sample state.
    pub fn run(&self, sample: &Sample, cache: &mut QueryCache) -> Result<PipelineResult, PipelineError> {
        cache.bind(&self.fingerprint);
        let ctx = self.context();

        let initial = MappingState::new(
            sample.accession.clone(),
            sample.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let mut state = MappingState::default();
        state.accession = initial.accession.clone();
        for attr in &initial.attributes {
            let fragment = match cache.get(&attr.key, &attr.value) {
                Some(fragment) => fragment,
                None => {
                    let fragment = Arc::new(self.run_prefix(attr, &ctx)?);
                    cache.insert(&attr.key, &attr.value, Arc::clone(&fragment));
                    fragment
                }
            };
            if let Some(attribute) = &fragment.attribute {
                state.attributes.push(attribute.clone());
            }
            for m in &fragment.matches {
                state.add_match(m.clone());
            }
            for rv in &fragment.real_values {
                state.add_real_value(rv.clone());
            }
        }

        let state = self.run_stages(&self.stages[self.cacheable_prefix..], state, &ctx)?;
        tracing::trace!(
            accession = ?state.accession,
            matches = state.match_count(),
            real_values = state.real_value_count(),
            "sample mapped"
        );

        let accession = state.accession.clone();
        let attributes = state.attributes.clone();
        let (matches, real_values) = state.into_results();
        Ok(PipelineResult {
            accession,
            attributes,
            matches,
            real_values,
        })
    }

    /// Map samples one after another with a shared cache.
    ///
    /// Each sample is isolated: an error or a panic becomes that sample's
    /// `Err` and the remaining samples still run.
    pub fn run_multiple(
        &self,
        samples: &[Sample],
        cache: &mut QueryCache,
    ) -> Vec<Result<PipelineResult, PipelineError>> {
        samples
            .iter()
            .map(|sample| {
                catch_unwind(AssertUnwindSafe(|| self.run(sample, cache))).unwrap_or_else(|panic| {
                    Err(PipelineError::Panicked {
                        detail: panic_message(panic.as_ref()),
                    })
                })
            })
            .collect()
    }

    fn run_prefix(&self, attr: &Attribute, ctx: &StageContext<'_>) -> Result<AttributeFragment, PipelineError> {
        let state = MappingState::new(None, [(attr.key.as_str(), attr.value.as_str())]);
        let state = self.run_stages(&self.stages[..self.cacheable_prefix], state, ctx)?;
        let attribute = state.attributes.first().cloned();
        let (matches, real_values) = state.into_results();
        Ok(AttributeFragment {
            attribute,
            matches,
            real_values,
        })
    }

    fn run_stages(
        &self,
        stages: &[Stage],
        mut state: MappingState,
        ctx: &StageContext<'_>,
    ) -> Result<MappingState, PipelineError> {
        for stage in stages {
            state = stage
                .apply(state, ctx)
                .map_err(|source| PipelineError::Stage {
                    stage: stage.name(),
                    source,
                })?;
            tracing::trace!(
                stage = stage.name(),
                spans = state.attributes.iter().map(|a| a.spans.len()).sum::<usize>(),
                matches = state.match_count(),
                real_values = state.real_value_count(),
                "stage applied"
            );
        }
        Ok(state)
    }
}

fn standard_stages(config: &PipelineConfig) -> Vec<Stage> {
    let mut stages = vec![
        Stage::KeyValueFilter,
        Stage::InitKeyValueTokens,
        Stage::NGram {
            max_len: config.ngram_max_len,
        },
        Stage::Lowercase,
    ];
    stages.extend(
        config
            .delimiters
            .iter()
            .map(|&delimiter| Stage::Delimit { delimiter }),
    );
    stages.extend([
        Stage::InflectionalVariants,
        Stage::SpellingVariants,
        Stage::ManuallyAnnotatedSynonyms,
        Stage::AcronymToExpansion,
        Stage::ParseTimeWithUnit,
        Stage::ExactStringMatching {
            ontology_ids: config.exact_ontology_ids.clone(),
            query_len_thresh: config.exact_query_len_thresh,
        },
        Stage::TwoCharMappings,
        Stage::PropertySpecificSynonym,
        Stage::FuzzyStringMatching {
            ontology_ids: config.exact_ontology_ids.clone(),
            distance_threshold: config.fuzzy_distance_threshold,
            query_len_thresh: config.fuzzy_query_len_thresh,
        },
        Stage::ExactMatchCustomTargets,
        Stage::BlockCellLineNonCellLineKey,
        Stage::LinkedTermsOfSuperterms,
        Stage::CellLineToImpliedDisease,
        Stage::RemoveSubIntervalOfMatchedBlockAncestralLink,
        Stage::CustomConsequentTerms,
        Stage::ExtractRealValue,
        Stage::FilterOntologyMatchesByPriority,
        Stage::InferCellLineTerms,
        Stage::ImpliedDevelopmentalStageFromAge,
        Stage::ConsequentCulturedCell,
    ]);
    stages
}

fn compute_fingerprint(stages: &[Stage], ontologies: &OntologySet, resources: &Resources) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(stages).unwrap_or_default());
    hasher.update(serde_json::to_vec(resources).unwrap_or_default());
    hasher.update(ontologies.fingerprint().as_bytes());
    hex::encode(hasher.finalize())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
