//! Dictionary and table driven matching.

use super::known_term;
use crate::pipeline::{MappingState, MatchCandidate, MatchMethod, SpanKind, StageContext};
use crate::text::{char_len, normalize_label};

/// Match span text exactly (after normalization) against term names and
/// synonyms of the given ontologies.
///
/// Spans shorter than `query_len_thresh` characters are never matched.
/// Hits on original text are `Exact`; hits on variant text are `Synonym`.
pub fn exact_string_matching(
    mut state: MappingState,
    ctx: &StageContext<'_>,
    ontology_ids: &[String],
    query_len_thresh: usize,
) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        for span in &attr.spans {
            let query = normalize_label(&span.text);
            if char_len(&query) < query_len_thresh {
                continue;
            }
            let method = match span.kind {
                SpanKind::Original => MatchMethod::Exact,
                SpanKind::Variant => MatchMethod::Synonym,
            };
            for term_id in ctx.ontologies.lookup_label(&query, ontology_ids) {
                found.push(MatchCandidate::from_span(
                    term_id,
                    &attr.key,
                    span,
                    method,
                    1.0,
                    format!("ExactStringMatching: '{}'", query),
                ));
            }
        }
    }
    add_all(&mut state, found, "ExactStringMatching");
    state
}

/// Two-character values ("LN", "BM") mapped through a fixed table
pub fn two_char_mappings(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        for span in &attr.spans {
            let query = normalize_label(&span.text);
            if char_len(&query) != 2 {
                continue;
            }
            for term_id in ctx.resources.two_char_targets(&query) {
                if known_term(ctx, term_id, "TwoCharMappings") {
                    found.push(MatchCandidate::from_span(
                        term_id.clone(),
                        &attr.key,
                        span,
                        MatchMethod::Custom,
                        1.0,
                        format!("TwoCharMappings: '{}'", query),
                    ));
                }
            }
        }
    }
    add_all(&mut state, found, "TwoCharMappings");
    state
}

/// Whole values whose meaning depends on the key ("sex": "M")
pub fn property_specific_synonym(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        let key_norm = attr.key_norm();
        for span in attr.spans.iter().filter(|s| s.covers(&attr.value)) {
            let query = normalize_label(&span.text);
            for term_id in ctx.resources.property_synonym_targets(&key_norm, &query) {
                if known_term(ctx, term_id, "PropertySpecificSynonym") {
                    found.push(MatchCandidate::from_span(
                        term_id.clone(),
                        &attr.key,
                        span,
                        MatchMethod::Custom,
                        1.0,
                        format!("PropertySpecificSynonym: {} = '{}'", key_norm, query),
                    ));
                }
            }
        }
    }
    add_all(&mut state, found, "PropertySpecificSynonym");
    state
}

/// Keyword table lookups, then operator keyword overrides.
///
/// A span hit by an override loses every text match found inside it by
/// earlier stages, so an override can correct a wrong exact match.
pub fn exact_match_custom_targets(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    let mut overridden: Vec<(String, usize, usize)> = Vec::new();
    for attr in &state.attributes {
        for span in &attr.spans {
            let query = normalize_label(&span.text);
            let overrides = ctx.resources.keyword_override_for(&query);
            let (directives, step) = if overrides.is_empty() {
                (ctx.resources.custom_targets_for(&query), "ExactMatchCustomTargets")
            } else {
                (overrides, "KeywordOverride")
            };
            for directive in directives {
                let term_id = directive.term_id();
                if !known_term(ctx, term_id, "ExactMatchCustomTargets") {
                    continue;
                }
                let mut candidate = MatchCandidate::from_span(
                    term_id,
                    &attr.key,
                    span,
                    MatchMethod::Custom,
                    1.0,
                    format!("{}: '{}'", step, query),
                );
                if directive.consequent() {
                    candidate.method = MatchMethod::Consequent;
                    candidate.is_consequent = true;
                } else if !overrides.is_empty() {
                    overridden.push((attr.key.clone(), span.start, span.end));
                }
                found.push(candidate);
            }
        }
    }

    if !overridden.is_empty() {
        let before = state.match_count();
        state.retain_matches(|m| {
            m.is_consequent
                || !overridden
                    .iter()
                    .any(|(key, start, end)| m.origin_key == *key && *start <= m.start && m.end <= *end)
        });
        tracing::debug!(
            removed = before - state.match_count(),
            "text matches replaced by keyword override"
        );
    }
    add_all(&mut state, found, "ExactMatchCustomTargets");
    state
}

fn add_all(state: &mut MappingState, found: Vec<MatchCandidate>, stage: &str) {
    let mut added = 0;
    for candidate in found {
        if state.add_match(candidate) {
            added += 1;
        }
    }
    tracing::trace!(stage, added, total = state.match_count(), "matches");
}
