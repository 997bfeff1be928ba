//! Conflict resolution between text matches.
//!
//! Consequent matches are not tied to text and are never removed here.

use std::collections::BTreeMap;

use crate::pipeline::{MappingState, MatchCandidate, MatchKey, StageContext};
use crate::text::normalize_key;

/// Drop cell-line matches under keys that never name a cell line
pub fn block_cell_line_non_cell_line_key(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let blocked = &ctx.resources.cell_line.non_cell_line_keys;
    state.retain_matches(|m| {
        let block = blocked.contains(&normalize_key(&m.origin_key))
            && ctx.resources.is_cell_line_term(&m.term_id, ctx.ontologies);
        if block {
            tracing::trace!(term = %m.term_id, key = %m.origin_key, "blocked cell line match");
        }
        !block
    });
    state
}

/// Drop matches on a span strictly inside another match's span when the
/// inner term adds nothing: it is an ancestor of the outer term, the same
/// term, or an unrelated term found by a weaker method.
///
/// An inner term that is more specific than the outer term survives
/// ("T cell" inside "T cell line" where the line term is generic).
pub fn remove_sub_interval_of_matched_block_ancestral_link(
    mut state: MappingState,
    ctx: &StageContext<'_>,
) -> MappingState {
    let text_matches: Vec<&MatchCandidate> = state.matches().filter(|m| !m.is_consequent).collect();

    let mut subsumed: Vec<MatchKey> = Vec::new();
    for inner in &text_matches {
        let dominated = text_matches
            .iter()
            .any(|outer| outer.strictly_contains(inner) && subsumes(ctx, outer, inner));
        if dominated {
            subsumed.push(inner.key());
        }
    }

    for key in &subsumed {
        if let Some(removed) = state.remove_match(key) {
            tracing::trace!(term = %removed.term_id, key = %removed.origin_key, "removed sub-interval match");
        }
    }
    state
}

fn subsumes(ctx: &StageContext<'_>, outer: &MatchCandidate, inner: &MatchCandidate) -> bool {
    if outer.term_id == inner.term_id {
        return true;
    }
    if ctx.ontologies.is_strict_ancestor(&inner.term_id, &outer.term_id) {
        return true;
    }
    if ctx.ontologies.is_strict_ancestor(&outer.term_id, &inner.term_id) {
        return false;
    }
    outer.method.priority() > inner.method.priority()
}

/// Keep one match per overlapping region of each key.
///
/// Matches are taken greedily by method priority, then span length, then
/// ontology priority, then term ID; a match overlapping one already kept is
/// dropped.
pub fn filter_ontology_matches_by_priority(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut by_key: BTreeMap<&str, Vec<&MatchCandidate>> = BTreeMap::new();
    for m in state.matches().filter(|m| !m.is_consequent) {
        by_key.entry(m.origin_key.as_str()).or_default().push(m);
    }

    let mut dropped: Vec<MatchKey> = Vec::new();
    for candidates in by_key.values_mut() {
        candidates.sort_by(|a, b| {
            b.method
                .priority()
                .cmp(&a.method.priority())
                .then_with(|| b.span_len().cmp(&a.span_len()))
                .then_with(|| ctx.ontologies.rank(&a.term_id).cmp(&ctx.ontologies.rank(&b.term_id)))
                .then_with(|| a.term_id.cmp(&b.term_id))
                .then_with(|| a.start.cmp(&b.start))
        });

        let mut kept: Vec<&MatchCandidate> = Vec::new();
        for candidate in candidates.iter() {
            if kept.iter().any(|k| k.overlaps(candidate)) {
                dropped.push(candidate.key());
            } else {
                kept.push(candidate);
            }
        }
    }

    for key in &dropped {
        state.remove_match(key);
    }
    tracing::trace!(dropped = dropped.len(), kept = state.match_count(), "priority filter");
    state
}
