//! Static lexical resources and rule tables used by the stages.
//!
//! Resources are loaded from YAML once, normalized, and then shared
//! read-only by every pipeline run. The built-in tables live in
//! `config/resources.yaml`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::KeywordOverrides;
use crate::error::ConfigError;
use crate::ontology::{OntologySet, Relation, TermId};
use crate::text::{normalize_key, normalize_label};

const BUILTIN_RESOURCES: &str = include_str!("../config/resources.yaml");

/// Connector words dropped between a property key and its unit ("age in years")
const KEY_UNIT_CONNECTORS: &[&str] = &["in", "at", "of"];

/// One term-mapping directive from a custom table or keyword override.
///
/// Accepts either a bare term ID or `{ term_id, consequent }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingDirective {
    TermId(TermId),
    Detailed {
        term_id: TermId,
        #[serde(default)]
        consequent: bool,
    },
}

impl MappingDirective {
    pub fn term_id(&self) -> &str {
        match self {
            Self::TermId(id) => id,
            Self::Detailed { term_id, .. } => term_id,
        }
    }

    pub fn consequent(&self) -> bool {
        match self {
            Self::TermId(_) => false,
            Self::Detailed { consequent, .. } => *consequent,
        }
    }
}

/// Value synonyms that only apply under particular attribute keys
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySynonymTable {
    pub keys: BTreeSet<String>,
    pub values: BTreeMap<String, Vec<TermId>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellLineRules {
    /// Term ID prefixes of cell-line ontologies (e.g., "CVCL")
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Generic cell-line term; its descendants are cell lines too
    #[serde(default)]
    pub root_term: Option<TermId>,

    /// Keys that never denote a cell line
    #[serde(default)]
    pub non_cell_line_keys: BTreeSet<String>,

    /// Relations from a cell line to the disease it was derived from
    #[serde(default)]
    pub disease_relations: Vec<Relation>,

    /// Static cell line → disease table
    #[serde(default)]
    pub diseases: BTreeMap<TermId, Vec<TermId>>,

    /// Relations from a cell line to the cell type / anatomy it derives from
    #[serde(default)]
    pub inferred_relations: Vec<Relation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDef {
    pub id: TermId,
    pub name: String,
    pub labels: BTreeSet<String>,

    /// Conversion factor to years, for time units
    #[serde(default)]
    pub years: Option<f64>,
}

impl UnitDef {
    pub fn is_time(&self) -> bool {
        self.years.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    pub id: TermId,
    pub name: String,
    pub keys: BTreeSet<String>,

    /// True for properties measured in time units (age, time point)
    #[serde(default)]
    pub time: bool,

    /// Unit assumed when neither key nor value names one
    #[serde(default)]
    pub default_unit: Option<TermId>,
}

/// Maps an age range (in years) to a developmental stage term
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentalStageRule {
    pub property: TermId,
    pub term: TermId,
    /// Inclusive lower bound in years
    #[serde(default)]
    pub min_years: Option<f64>,
    /// Exclusive upper bound in years
    #[serde(default)]
    pub max_years: Option<f64>,
}

impl DevelopmentalStageRule {
    pub fn contains(&self, years: f64) -> bool {
        self.min_years.map_or(true, |min| years >= min)
            && self.max_years.map_or(true, |max| years < max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CulturedCellRule {
    /// Term added as a consequence (e.g., "cultured cell")
    pub term: TermId,
    /// Matches under this root count as cell types
    pub cell_type_root: TermId,
    /// Keys whose presence indicates a cultured sample
    #[serde(default)]
    pub keys: BTreeSet<String>,
}

/// All static tables used by the stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub placeholder_values: BTreeSet<String>,
    #[serde(default)]
    pub ignored_keys: BTreeSet<String>,
    #[serde(default)]
    pub inflections: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub spelling_variants: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub acronyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub two_char_mappings: BTreeMap<String, Vec<TermId>>,
    #[serde(default)]
    pub property_synonyms: Vec<PropertySynonymTable>,
    #[serde(default)]
    pub custom_targets: BTreeMap<String, Vec<MappingDirective>>,
    /// Operator keyword overrides; these win over every other text match
    /// on the span they cover
    #[serde(default)]
    pub keyword_overrides: BTreeMap<String, Vec<MappingDirective>>,
    #[serde(default)]
    pub custom_consequents: BTreeMap<TermId, Vec<TermId>>,
    #[serde(default)]
    pub cell_line: CellLineRules,
    #[serde(default)]
    pub units: Vec<UnitDef>,
    #[serde(default)]
    pub real_value_properties: Vec<PropertyDef>,
    #[serde(default)]
    pub developmental_stages: Vec<DevelopmentalStageRule>,
    #[serde(default)]
    pub cultured_cell: Option<CulturedCellRule>,
}

impl Resources {
    /// The tables shipped with the crate
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_RESOURCES)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let resources: Resources = serde_yaml::from_str(yaml)?;
        Ok(resources.normalized())
    }

    /// Re-key every table by its normalized form
    fn normalized(self) -> Self {
        Self {
            placeholder_values: self.placeholder_values.iter().map(|v| normalize_label(v)).collect(),
            ignored_keys: self.ignored_keys.iter().map(|k| normalize_key(k)).collect(),
            inflections: normalize_phrase_map(self.inflections),
            spelling_variants: normalize_phrase_map(self.spelling_variants),
            synonyms: normalize_phrase_map(self.synonyms),
            acronyms: normalize_phrase_map(self.acronyms),
            two_char_mappings: normalize_keys(self.two_char_mappings),
            property_synonyms: self
                .property_synonyms
                .into_iter()
                .map(|table| PropertySynonymTable {
                    keys: table.keys.iter().map(|k| normalize_key(k)).collect(),
                    values: normalize_keys(table.values),
                })
                .collect(),
            custom_targets: normalize_keys(self.custom_targets),
            keyword_overrides: normalize_keys(self.keyword_overrides),
            custom_consequents: self.custom_consequents,
            cell_line: CellLineRules {
                non_cell_line_keys: self
                    .cell_line
                    .non_cell_line_keys
                    .iter()
                    .map(|k| normalize_key(k))
                    .collect(),
                ..self.cell_line
            },
            units: self
                .units
                .into_iter()
                .map(|unit| UnitDef {
                    labels: unit.labels.iter().map(|l| normalize_label(l)).collect(),
                    ..unit
                })
                .collect(),
            real_value_properties: self
                .real_value_properties
                .into_iter()
                .map(|prop| PropertyDef {
                    keys: prop.keys.iter().map(|k| normalize_key(k)).collect(),
                    ..prop
                })
                .collect(),
            developmental_stages: self.developmental_stages,
            cultured_cell: self.cultured_cell.map(|rule| CulturedCellRule {
                keys: rule.keys.iter().map(|k| normalize_key(k)).collect(),
                ..rule
            }),
        }
    }

    /// Install operator keyword overrides. A keyword also present in the
    /// custom-target table is taken out of it.
    pub fn apply_keyword_overrides(&mut self, overrides: &KeywordOverrides) {
        for (keyword, directives) in overrides.entries() {
            let keyword = normalize_label(keyword);
            self.custom_targets.remove(&keyword);
            self.keyword_overrides.insert(keyword, directives.to_vec());
        }
    }

    // =========================================================================
    // Lookups (all inputs are normalized by the caller)
    // =========================================================================

    pub fn is_placeholder(&self, value_norm: &str) -> bool {
        self.placeholder_values.contains(value_norm)
    }

    pub fn is_ignored_key(&self, key_norm: &str) -> bool {
        self.ignored_keys.contains(key_norm)
    }

    pub fn inflection_bases(&self, word: &str) -> &[String] {
        lookup(&self.inflections, word)
    }

    pub fn spelling_variants_of(&self, word: &str) -> &[String] {
        lookup(&self.spelling_variants, word)
    }

    pub fn synonyms_of(&self, phrase: &str) -> &[String] {
        lookup(&self.synonyms, phrase)
    }

    pub fn acronym_expansions(&self, acronym: &str) -> &[String] {
        lookup(&self.acronyms, acronym)
    }

    pub fn two_char_targets(&self, text: &str) -> &[TermId] {
        lookup(&self.two_char_mappings, text)
    }

    pub fn custom_targets_for(&self, text: &str) -> &[MappingDirective] {
        lookup(&self.custom_targets, text)
    }

    pub fn keyword_override_for(&self, text: &str) -> &[MappingDirective] {
        lookup(&self.keyword_overrides, text)
    }

    pub fn custom_consequents_of(&self, term_id: &str) -> &[TermId] {
        lookup(&self.custom_consequents, term_id)
    }

    /// Terms for `value_norm` under the key, if a property-specific table applies
    pub fn property_synonym_targets(&self, key_norm: &str, value_norm: &str) -> &[TermId] {
        self.property_synonyms
            .iter()
            .filter(|table| table.keys.contains(key_norm))
            .find_map(|table| table.values.get(value_norm))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn unit(&self, unit_id: &str) -> Option<&UnitDef> {
        self.units.iter().find(|u| u.id == unit_id)
    }

    pub fn unit_by_label(&self, label_norm: &str) -> Option<&UnitDef> {
        self.units.iter().find(|u| u.labels.contains(label_norm))
    }

    pub fn property(&self, property_id: &str) -> Option<&PropertyDef> {
        self.real_value_properties.iter().find(|p| p.id == property_id)
    }

    /// Resolve a normalized key to a quantitative property.
    ///
    /// The key either names the property exactly ("age") or names it
    /// followed by a unit ("age years", "age in weeks"). Returns the unit
    /// named by the key, if any.
    pub fn property_for_key(&self, key_norm: &str) -> Option<(&PropertyDef, Option<&UnitDef>)> {
        let words: Vec<&str> = key_norm.split_whitespace().collect();
        for split in (1..=words.len()).rev() {
            let prefix = words[..split].join(" ");
            let Some(property) = self
                .real_value_properties
                .iter()
                .find(|p| p.keys.contains(&prefix))
            else {
                continue;
            };

            let mut rest = &words[split..];
            while let Some((first, tail)) = rest.split_first() {
                if KEY_UNIT_CONNECTORS.contains(first) {
                    rest = tail;
                } else {
                    break;
                }
            }
            if rest.is_empty() {
                return Some((property, None));
            }
            if let Some(unit) = self.unit_by_label(&rest.join(" ")) {
                return Some((property, Some(unit)));
            }
        }
        None
    }

    /// True if the term belongs to a cell-line ontology or descends from
    /// the generic cell-line term
    pub fn is_cell_line_term(&self, term_id: &str, ontologies: &OntologySet) -> bool {
        let in_namespace = self.cell_line.namespaces.iter().any(|ns| {
            term_id
                .strip_prefix(ns.as_str())
                .map(|rest| rest.starts_with(':') || rest.starts_with('_'))
                .unwrap_or(false)
        });
        if in_namespace {
            return true;
        }
        match &self.cell_line.root_term {
            Some(root) => ontologies.is_strict_ancestor(root, term_id),
            None => false,
        }
    }
}

fn lookup<'a, V>(map: &'a BTreeMap<String, Vec<V>>, key: &str) -> &'a [V] {
    map.get(key).map(|v| v.as_slice()).unwrap_or(&[])
}

fn normalize_keys<V>(map: BTreeMap<String, Vec<V>>) -> BTreeMap<String, Vec<V>> {
    let mut out: BTreeMap<String, Vec<V>> = BTreeMap::new();
    for (key, values) in map {
        out.entry(normalize_label(&key)).or_default().extend(values);
    }
    out
}

fn normalize_phrase_map(map: BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, values) in map {
        let entry = out.entry(normalize_label(&key)).or_default();
        for value in values {
            let value = normalize_label(&value);
            if !value.is_empty() && !entry.contains(&value) {
                entry.push(value);
            }
        }
    }
    out
}
