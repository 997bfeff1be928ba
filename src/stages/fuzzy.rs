//! Approximate string matching against the label dictionary.
//!
//! Dissimilarity is the Levenshtein edit distance divided by the longer
//! string's character count. A label is accepted when its dissimilarity is
//! strictly below the threshold, so a lower threshold is stricter.

use std::collections::BTreeSet;

use crate::pipeline::{MappingState, MatchCandidate, MatchMethod, StageContext};
use crate::text::{char_len, normalize_label};

/// Best label found for a query
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FuzzyHit {
    pub term_id: String,
    pub label: String,
    pub dissimilarity: f64,
}

/// Fuzzy-match spans that have no exact or synonym hit at the same offsets.
///
/// Each span yields at most one match: the lowest dissimilarity, then the
/// shortest term name, then the smallest term ID.
pub fn fuzzy_string_matching(
    mut state: MappingState,
    ctx: &StageContext<'_>,
    ontology_ids: &[String],
    distance_threshold: f64,
    query_len_thresh: usize,
) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        let matched_regions: BTreeSet<(usize, usize)> = state
            .matches()
            .filter(|m| m.origin_key == attr.key)
            .filter(|m| matches!(m.method, MatchMethod::Exact | MatchMethod::Synonym))
            .map(|m| (m.start, m.end))
            .collect();

        let mut queried: BTreeSet<(usize, usize, String)> = BTreeSet::new();
        for span in &attr.spans {
            if matched_regions.contains(&(span.start, span.end)) {
                continue;
            }
            let query = normalize_label(&span.text);
            if char_len(&query) < query_len_thresh
                || !queried.insert((span.start, span.end, query.clone()))
            {
                continue;
            }
            if let Some(hit) = best_fuzzy_hit(ctx, &query, ontology_ids, distance_threshold) {
                found.push(MatchCandidate::from_span(
                    hit.term_id,
                    &attr.key,
                    span,
                    MatchMethod::Fuzzy,
                    1.0 - hit.dissimilarity,
                    format!(
                        "FuzzyStringMatching: '{}' ~ '{}' ({:.3})",
                        query, hit.label, hit.dissimilarity
                    ),
                ));
            }
        }
    }

    for candidate in found {
        state.add_match(candidate);
    }
    tracing::trace!(total = state.match_count(), "fuzzy matching done");
    state
}

pub(crate) fn best_fuzzy_hit(
    ctx: &StageContext<'_>,
    query: &str,
    ontology_ids: &[String],
    distance_threshold: f64,
) -> Option<FuzzyHit> {
    let query_len = char_len(query);
    let lengths = candidate_lengths(query_len, distance_threshold);

    let mut best: Option<(FuzzyHit, usize)> = None;
    for graph in ctx.ontologies.graphs() {
        if !ontology_ids.is_empty() && !ontology_ids.iter().any(|id| id == graph.id()) {
            continue;
        }
        for (label, term_id) in graph.labels_in_len_range(lengths.clone()) {
            let dissimilarity = dissimilarity(query, query_len, label);
            if dissimilarity >= distance_threshold {
                continue;
            }
            let name_len = graph.name(term_id).map(char_len).unwrap_or(usize::MAX);
            let better = match &best {
                None => true,
                Some((current, current_name_len)) => {
                    (dissimilarity, name_len, term_id)
                        < (current.dissimilarity, *current_name_len, current.term_id.as_str())
                }
            };
            if better {
                best = Some((
                    FuzzyHit {
                        term_id: term_id.to_string(),
                        label: label.to_string(),
                        dissimilarity,
                    },
                    name_len,
                ));
            }
        }
    }
    best.map(|(hit, _)| hit)
}

/// Edit distance over the longer length, in characters
fn dissimilarity(query: &str, query_len: usize, label: &str) -> f64 {
    let longest = query_len.max(char_len(label));
    if longest == 0 {
        return 0.0;
    }
    strsim::levenshtein(query, label) as f64 / longest as f64
}

/// Label lengths that could possibly fall under the threshold.
///
/// Edit distance is at least the length difference, so a label of length
/// `l` needs `|l - n| / max(l, n) < t`.
fn candidate_lengths(query_len: usize, threshold: f64) -> std::ops::RangeInclusive<usize> {
    let n = query_len as f64;
    let lo = (n * (1.0 - threshold)).floor() as usize;
    let hi = (n / (1.0 - threshold)).ceil() as usize;
    lo.max(1)..=hi
}
