//! The closed set of pipeline stages.
//!
//! Each variant is one rule family. Dispatch goes through [`Stage::apply`],
//! which hands the state to the rule function in `crate::stages`.

use serde::Serialize;

use super::state::MappingState;
use crate::error::StageError;
use crate::ontology::OntologySet;
use crate::resources::Resources;
use crate::stages::{conflicts, consequents, fuzzy, matching, real_value, tokenize, variants};

/// Shared read-only resources every stage may query
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub ontologies: &'a OntologySet,
    pub resources: &'a Resources,
}

/// What a stage reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScope {
    /// Depends on a single key/value pair; results may be cached
    Attribute,
    /// Reads other attributes or other attributes' matches
    Sample,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage")]
pub enum Stage {
    KeyValueFilter,
    InitKeyValueTokens,
    NGram {
        max_len: usize,
    },
    Lowercase,
    Delimit {
        delimiter: char,
    },
    InflectionalVariants,
    SpellingVariants,
    ManuallyAnnotatedSynonyms,
    AcronymToExpansion,
    ParseTimeWithUnit,
    ExactStringMatching {
        ontology_ids: Vec<String>,
        query_len_thresh: usize,
    },
    TwoCharMappings,
    PropertySpecificSynonym,
    FuzzyStringMatching {
        ontology_ids: Vec<String>,
        distance_threshold: f64,
        query_len_thresh: usize,
    },
    ExactMatchCustomTargets,
    BlockCellLineNonCellLineKey,
    LinkedTermsOfSuperterms,
    CellLineToImpliedDisease,
    RemoveSubIntervalOfMatchedBlockAncestralLink,
    CustomConsequentTerms,
    ExtractRealValue,
    FilterOntologyMatchesByPriority,
    InferCellLineTerms,
    ImpliedDevelopmentalStageFromAge,
    ConsequentCulturedCell,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyValueFilter => "KeyValueFilter",
            Self::InitKeyValueTokens => "InitKeyValueTokens",
            Self::NGram { .. } => "NGram",
            Self::Lowercase => "Lowercase",
            Self::Delimit { .. } => "Delimit",
            Self::InflectionalVariants => "InflectionalVariants",
            Self::SpellingVariants => "SpellingVariants",
            Self::ManuallyAnnotatedSynonyms => "ManuallyAnnotatedSynonyms",
            Self::AcronymToExpansion => "AcronymToExpansion",
            Self::ParseTimeWithUnit => "ParseTimeWithUnit",
            Self::ExactStringMatching { .. } => "ExactStringMatching",
            Self::TwoCharMappings => "TwoCharMappings",
            Self::PropertySpecificSynonym => "PropertySpecificSynonym",
            Self::FuzzyStringMatching { .. } => "FuzzyStringMatching",
            Self::ExactMatchCustomTargets => "ExactMatchCustomTargets",
            Self::BlockCellLineNonCellLineKey => "BlockCellLineNonCellLineKey",
            Self::LinkedTermsOfSuperterms => "LinkedTermsOfSuperterms",
            Self::CellLineToImpliedDisease => "CellLineToImpliedDisease",
            Self::RemoveSubIntervalOfMatchedBlockAncestralLink => {
                "RemoveSubIntervalOfMatchedBlockAncestralLink"
            }
            Self::CustomConsequentTerms => "CustomConsequentTerms",
            Self::ExtractRealValue => "ExtractRealValue",
            Self::FilterOntologyMatchesByPriority => "FilterOntologyMatchesByPriority",
            Self::InferCellLineTerms => "InferCellLineTerms",
            Self::ImpliedDevelopmentalStageFromAge => "ImpliedDevelopmentalStageFromAge",
            Self::ConsequentCulturedCell => "ConsequentCulturedCell",
        }
    }

    pub fn scope(&self) -> StageScope {
        match self {
            Self::LinkedTermsOfSuperterms | Self::ConsequentCulturedCell => StageScope::Sample,
            _ => StageScope::Attribute,
        }
    }

    /// Transform the state. The context is read-only.
    pub fn apply(&self, state: MappingState, ctx: &StageContext<'_>) -> Result<MappingState, StageError> {
        let state = match self {
            Self::KeyValueFilter => tokenize::key_value_filter(state, ctx),
            Self::InitKeyValueTokens => tokenize::init_key_value_tokens(state),
            Self::NGram { max_len } => tokenize::ngram(state, *max_len),
            Self::Lowercase => tokenize::lowercase(state),
            Self::Delimit { delimiter } => tokenize::delimit(state, *delimiter),
            Self::InflectionalVariants => variants::inflectional_variants(state, ctx),
            Self::SpellingVariants => variants::spelling_variants(state, ctx),
            Self::ManuallyAnnotatedSynonyms => variants::manually_annotated_synonyms(state, ctx),
            Self::AcronymToExpansion => variants::acronym_to_expansion(state, ctx),
            Self::ParseTimeWithUnit => real_value::parse_time_with_unit(state, ctx),
            Self::ExactStringMatching {
                ontology_ids,
                query_len_thresh,
            } => matching::exact_string_matching(state, ctx, ontology_ids, *query_len_thresh),
            Self::TwoCharMappings => matching::two_char_mappings(state, ctx),
            Self::PropertySpecificSynonym => matching::property_specific_synonym(state, ctx),
            Self::FuzzyStringMatching {
                ontology_ids,
                distance_threshold,
                query_len_thresh,
            } => fuzzy::fuzzy_string_matching(
                state,
                ctx,
                ontology_ids,
                *distance_threshold,
                *query_len_thresh,
            ),
            Self::ExactMatchCustomTargets => matching::exact_match_custom_targets(state, ctx),
            Self::BlockCellLineNonCellLineKey => {
                conflicts::block_cell_line_non_cell_line_key(state, ctx)
            }
            Self::LinkedTermsOfSuperterms => consequents::linked_terms_of_superterms(state, ctx),
            Self::CellLineToImpliedDisease => consequents::cell_line_to_implied_disease(state, ctx),
            Self::RemoveSubIntervalOfMatchedBlockAncestralLink => {
                conflicts::remove_sub_interval_of_matched_block_ancestral_link(state, ctx)
            }
            Self::CustomConsequentTerms => consequents::custom_consequent_terms(state, ctx),
            Self::ExtractRealValue => real_value::extract_real_value(state, ctx),
            Self::FilterOntologyMatchesByPriority => {
                conflicts::filter_ontology_matches_by_priority(state, ctx)
            }
            Self::InferCellLineTerms => consequents::infer_cell_line_terms(state, ctx),
            Self::ImpliedDevelopmentalStageFromAge => {
                consequents::implied_developmental_stage_from_age(state, ctx)
            }
            Self::ConsequentCulturedCell => consequents::consequent_cultured_cell(state, ctx),
        };
        state
            .check_consistency()
            .map_err(|detail| StageError::Invariant {
                stage: self.name(),
                detail,
            })?;
        Ok(state)
    }
}
