//! Per-sample mapping state threaded through the stages.
//!
//! One `MappingState` exists per sample (or per attribute while the
//! attribute-scope prefix runs). It is owned by the pipeline run, passed by
//! value from stage to stage and discarded once its output is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StageError;
use crate::ontology::TermId;
use crate::text::normalize_key;

/// How a span's text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A slice of the original value (possibly lowercased or delimited)
    Original,
    /// An alternate surface form from a lexical resource
    Variant,
}

/// A region of an attribute value and its current text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpan {
    /// Start byte offset in the original value
    pub start: usize,
    /// End byte offset in the original value (exclusive)
    pub end: usize,
    /// Current text at this span
    pub text: String,
    pub kind: SpanKind,
    /// Steps that produced this text, oldest first
    #[serde(default)]
    pub path: Vec<String>,
}

impl TokenSpan {
    pub fn original(start: usize, end: usize, text: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            kind: SpanKind::Original,
            path: vec![step.into()],
        }
    }

    /// A new span over the same region, produced from this one
    pub fn derive(&self, text: impl Into<String>, kind: SpanKind, step: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(step.into());
        Self {
            start: self.start,
            end: self.end,
            text: text.into(),
            kind,
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the span covers the whole trimmed value
    pub fn covers(&self, value: &str) -> bool {
        let (start, end) = crate::text::trimmed_range(value);
        self.start == start && self.end == end
    }
}

/// One attribute of a sample and the spans built over its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub spans: Vec<TokenSpan>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            spans: Vec::new(),
        }
    }

    pub fn key_norm(&self) -> String {
        normalize_key(&self.key)
    }

    /// Add a span unless one with the same region and text exists.
    ///
    /// Fails if the span does not fall on character boundaries of the value.
    pub fn add_span(&mut self, span: TokenSpan) -> Result<bool, StageError> {
        if span.start > span.end
            || span.end > self.value.len()
            || !self.value.is_char_boundary(span.start)
            || !self.value.is_char_boundary(span.end)
        {
            return Err(StageError::InvalidSpan {
                key: self.key.clone(),
                start: span.start,
                end: span.end,
            });
        }
        let exists = self
            .spans
            .iter()
            .any(|s| s.start == span.start && s.end == span.end && s.text == span.text);
        if exists {
            return Ok(false);
        }
        self.spans.push(span);
        Ok(true)
    }

    /// Like [`Attribute::add_span`], but an invalid span is logged and
    /// dropped so the rest of the attribute still gets mapped.
    pub fn push_span(&mut self, span: TokenSpan, stage: &'static str) -> bool {
        match self.add_span(span) {
            Ok(added) => added,
            Err(err) => {
                tracing::debug!(stage, error = %err, "dropped span");
                false
            }
        }
    }

    /// Original slice of the value under a span
    pub fn slice(&self, start: usize, end: usize) -> &str {
        self.value.get(start..end).unwrap_or("")
    }
}

/// How a match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Synonym,
    Custom,
    Fuzzy,
    Consequent,
    Inferred,
}

impl MatchMethod {
    /// Rank used by conflict resolution; higher wins
    pub fn priority(self) -> u8 {
        match self {
            Self::Exact => 4,
            Self::Synonym | Self::Custom => 3,
            Self::Inferred => 2,
            Self::Fuzzy => 1,
            Self::Consequent => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Synonym => "synonym",
            Self::Custom => "custom",
            Self::Fuzzy => "fuzzy",
            Self::Consequent => "consequent",
            Self::Inferred => "inferred",
        }
    }
}

/// Uniqueness key of a match: (term, origin key, span)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub origin_key: String,
    pub start: usize,
    pub end: usize,
    pub term_id: TermId,
}

/// A proposed association between a value span and an ontology term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub term_id: TermId,
    pub origin_key: String,
    /// Byte range of the matched span in the original value
    pub start: usize,
    pub end: usize,
    /// Span text that produced the match
    pub matched_text: String,
    pub method: MatchMethod,
    /// 1.0 for exact and table matches, similarity for fuzzy matches
    pub score: f64,
    pub is_consequent: bool,
    pub path_to_mapping: Vec<String>,
}

impl MatchCandidate {
    /// A text match on a span, carrying the span's provenance
    pub fn from_span(
        term_id: impl Into<TermId>,
        origin_key: &str,
        span: &TokenSpan,
        method: MatchMethod,
        score: f64,
        step: impl Into<String>,
    ) -> Self {
        let mut path = span.path.clone();
        path.push(step.into());
        Self {
            term_id: term_id.into(),
            origin_key: origin_key.to_string(),
            start: span.start,
            end: span.end,
            matched_text: span.text.clone(),
            method,
            score,
            is_consequent: false,
            path_to_mapping: path,
        }
    }

    /// A match over an attribute's whole trimmed value
    pub fn whole_value(
        term_id: impl Into<TermId>,
        attr: &Attribute,
        method: MatchMethod,
        path_to_mapping: Vec<String>,
    ) -> Self {
        let (start, end) = crate::text::trimmed_range(&attr.value);
        Self {
            term_id: term_id.into(),
            origin_key: attr.key.clone(),
            start,
            end,
            matched_text: attr.slice(start, end).to_string(),
            method,
            score: 1.0,
            is_consequent: method == MatchMethod::Consequent,
            path_to_mapping,
        }
    }

    /// A match implied by this one, over the same span
    pub fn consequent(&self, term_id: impl Into<TermId>, method: MatchMethod, step: impl Into<String>) -> Self {
        let mut path = self.path_to_mapping.clone();
        path.push(step.into());
        Self {
            term_id: term_id.into(),
            origin_key: self.origin_key.clone(),
            start: self.start,
            end: self.end,
            matched_text: self.matched_text.clone(),
            method,
            score: self.score,
            is_consequent: method == MatchMethod::Consequent,
            path_to_mapping: path,
        }
    }

    pub fn key(&self) -> MatchKey {
        MatchKey {
            origin_key: self.origin_key.clone(),
            start: self.start,
            end: self.end,
            term_id: self.term_id.clone(),
        }
    }

    pub fn span_len(&self) -> usize {
        self.end - self.start
    }

    /// True if this span strictly contains `other`'s span on the same key
    pub fn strictly_contains(&self, other: &MatchCandidate) -> bool {
        self.origin_key == other.origin_key
            && self.start <= other.start
            && other.end <= self.end
            && (self.start, self.end) != (other.start, other.end)
    }

    pub fn overlaps(&self, other: &MatchCandidate) -> bool {
        self.origin_key == other.origin_key && self.start < other.end && other.start < self.end
    }
}

/// A numeric property extracted from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealValueCandidate {
    pub property_id: TermId,
    pub unit_id: Option<TermId>,
    pub value: f64,
    pub original_key: String,
    pub consequent: bool,
    pub path_to_mapping: Vec<String>,
}

type RealValueKey = (String, String, Option<TermId>, u64);

impl RealValueCandidate {
    fn key(&self) -> RealValueKey {
        (
            self.original_key.clone(),
            self.property_id.clone(),
            self.unit_id.clone(),
            self.value.to_bits(),
        )
    }
}

/// Mutable state of one sample during a pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingState {
    pub accession: Option<String>,
    /// Attributes in input order
    pub attributes: Vec<Attribute>,
    matches: BTreeMap<MatchKey, MatchCandidate>,
    real_values: BTreeMap<RealValueKey, RealValueCandidate>,
}

impl MappingState {
    /// Initial state from key/value pairs; later duplicates of a key are ignored
    pub fn new<K, V>(accession: Option<String>, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut state = Self {
            accession,
            ..Self::default()
        };
        for (key, value) in attributes {
            let key = key.into();
            if state.attributes.iter().any(|a| a.key == key) {
                continue;
            }
            state.attributes.push(Attribute::new(key, value));
        }
        state
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    /// Position of a key in input order (unknown keys sort last)
    pub fn attribute_index(&self, key: &str) -> usize {
        self.attributes
            .iter()
            .position(|a| a.key == key)
            .unwrap_or(self.attributes.len())
    }

    /// Insert a match. An existing match with the same key is replaced only
    /// by one with a higher method priority.
    pub fn add_match(&mut self, candidate: MatchCandidate) -> bool {
        let key = candidate.key();
        match self.matches.get(&key) {
            Some(existing) if existing.method.priority() >= candidate.method.priority() => false,
            _ => {
                self.matches.insert(key, candidate);
                true
            }
        }
    }

    pub fn remove_match(&mut self, key: &MatchKey) -> Option<MatchCandidate> {
        self.matches.remove(key)
    }

    /// Keep only matches for which `keep` returns true
    pub fn retain_matches(&mut self, mut keep: impl FnMut(&MatchCandidate) -> bool) {
        self.matches.retain(|_, m| keep(m));
    }

    /// Matches in (key, span, term) order
    pub fn matches(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.matches.values()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn has_match(&self, term_id: &str) -> bool {
        self.matches.values().any(|m| m.term_id == term_id)
    }

    pub fn add_real_value(&mut self, candidate: RealValueCandidate) -> bool {
        let key = candidate.key();
        if self.real_values.contains_key(&key) {
            return false;
        }
        self.real_values.insert(key, candidate);
        true
    }

    pub fn real_values(&self) -> impl Iterator<Item = &RealValueCandidate> {
        self.real_values.values()
    }

    pub fn real_value_count(&self) -> usize {
        self.real_values.len()
    }

    pub fn has_real_value_for_key(&self, key: &str) -> bool {
        self.real_values.values().any(|r| r.original_key == key)
    }

    /// Every match and real value must belong to an attribute still in the
    /// state, and text matches must lie on that attribute's value.
    pub fn check_consistency(&self) -> Result<(), String> {
        for m in self.matches.values() {
            let Some(attr) = self.attribute(&m.origin_key) else {
                return Err(format!(
                    "match {} refers to missing attribute '{}'",
                    m.term_id, m.origin_key
                ));
            };
            if m.start > m.end || attr.value.get(m.start..m.end).is_none() {
                return Err(format!(
                    "match {} at {}..{} is outside the value of '{}'",
                    m.term_id, m.start, m.end, m.origin_key
                ));
            }
        }
        if let Some(rv) = self
            .real_values
            .values()
            .find(|rv| self.attribute(&rv.original_key).is_none())
        {
            return Err(format!(
                "real value {} refers to missing attribute '{}'",
                rv.property_id, rv.original_key
            ));
        }
        Ok(())
    }

    /// Consume the state, returning matches and real values in stable order
    pub fn into_results(self) -> (Vec<MatchCandidate>, Vec<RealValueCandidate>) {
        (
            self.matches.into_values().collect(),
            self.real_values.into_values().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_match(term: &str, start: usize, end: usize, method: MatchMethod) -> MatchCandidate {
        MatchCandidate {
            term_id: term.to_string(),
            origin_key: "cell type".to_string(),
            start,
            end,
            matched_text: String::new(),
            method,
            score: 1.0,
            is_consequent: false,
            path_to_mapping: vec![],
        }
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let state = MappingState::new(None, vec![("tissue", "liver"), ("tissue", "lung")]);
        assert_eq!(state.attributes.len(), 1);
        assert_eq!(state.attributes[0].value, "liver");
    }

    #[test]
    fn test_keys_differing_in_case_are_distinct() {
        let state = MappingState::new(None, vec![("Tissue", "liver"), ("tissue", "lung")]);
        assert_eq!(state.attributes.len(), 2);
    }

    #[test]
    fn test_add_span_rejects_out_of_bounds() {
        let mut attr = Attribute::new("cell type", "T cell");
        assert!(attr.add_span(TokenSpan::original(0, 6, "T cell", "init")).unwrap());
        assert!(!attr.add_span(TokenSpan::original(0, 6, "T cell", "again")).unwrap());
        let err = attr.add_span(TokenSpan::original(2, 9, "cell", "bad")).unwrap_err();
        assert!(matches!(err, StageError::InvalidSpan { end: 9, .. }));
    }

    #[test]
    fn test_push_span_drops_invalid_span_only() {
        let mut attr = Attribute::new("tissue", "\u{130}x");
        assert!(!attr.push_span(TokenSpan::original(1, 3, "x", "bad"), "Delimit"));
        assert!(attr.push_span(TokenSpan::original(2, 3, "x", "good"), "Delimit"));
        assert_eq!(attr.spans.len(), 1);
    }

    #[test]
    fn test_consistency_rejects_orphaned_matches() {
        let mut state = MappingState::new(None, vec![("cell type", "T cell")]);
        assert!(state.add_match(text_match("CL:1", 0, 6, MatchMethod::Exact)));
        assert!(state.check_consistency().is_ok());

        state.add_match(text_match("CL:2", 2, 40, MatchMethod::Exact));
        let err = state.check_consistency().unwrap_err();
        assert!(err.contains("outside the value"), "{}", err);

        state.remove_match(&text_match("CL:2", 2, 40, MatchMethod::Exact).key());
        state.attributes.clear();
        let err = state.check_consistency().unwrap_err();
        assert!(err.contains("missing attribute 'cell type'"), "{}", err);
    }

    #[test]
    fn test_add_match_keeps_higher_priority() {
        let mut state = MappingState::default();
        assert!(state.add_match(text_match("CL:1", 0, 4, MatchMethod::Fuzzy)));
        assert!(state.add_match(text_match("CL:1", 0, 4, MatchMethod::Exact)));
        assert!(!state.add_match(text_match("CL:1", 0, 4, MatchMethod::Synonym)));
        assert_eq!(state.match_count(), 1);
        assert_eq!(state.matches().next().unwrap().method, MatchMethod::Exact);
    }

    #[test]
    fn test_span_containment() {
        let outer = text_match("CL:1", 0, 6, MatchMethod::Exact);
        let inner = text_match("CL:2", 2, 6, MatchMethod::Exact);
        assert!(outer.strictly_contains(&inner));
        assert!(!inner.strictly_contains(&outer));
        assert!(!outer.strictly_contains(&outer));
        assert!(outer.overlaps(&inner));
    }

    #[test]
    fn test_method_priority_order() {
        assert!(MatchMethod::Exact.priority() > MatchMethod::Synonym.priority());
        assert_eq!(MatchMethod::Synonym.priority(), MatchMethod::Custom.priority());
        assert!(MatchMethod::Custom.priority() > MatchMethod::Inferred.priority());
        assert!(MatchMethod::Inferred.priority() > MatchMethod::Fuzzy.priority());
    }

    #[test]
    fn test_real_values_deduplicate() {
        let mut state = MappingState::default();
        let rv = RealValueCandidate {
            property_id: "EFO:0000246".to_string(),
            unit_id: Some("UO:0000036".to_string()),
            value: 21.0,
            original_key: "age".to_string(),
            consequent: false,
            path_to_mapping: vec![],
        };
        assert!(state.add_real_value(rv.clone()));
        assert!(!state.add_real_value(rv));
        assert!(state.has_real_value_for_key("age"));
    }
}
