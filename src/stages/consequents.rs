//! Inference of matches from other matches and real values.

use super::known_term;
use crate::pipeline::{MappingState, MatchCandidate, MatchMethod, StageContext};
use crate::text::normalize_label;

/// Link other attributes whose whole value names an ancestor of a match.
///
/// With `{"cell type": "CD4+ T cell", "lineage": "lymphocyte"}`, the
/// "lymphocyte" value is matched (as `Inferred`) because lymphocyte is an
/// ancestor of the CD4+ T cell term.
pub fn linked_terms_of_superterms(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        let value_norm = normalize_label(&attr.value);
        let labelled = ctx.ontologies.lookup_label(&value_norm, &[]);
        if labelled.is_empty() {
            continue;
        }
        for m in state.matches().filter(|m| m.origin_key != attr.key) {
            for term_id in &labelled {
                if !ctx.ontologies.is_strict_ancestor(term_id, &m.term_id) {
                    continue;
                }
                let mut path = m.path_to_mapping.clone();
                path.push(format!(
                    "LinkedTermsOfSuperterms: '{}' is an ancestor of {}",
                    value_norm, m.term_id
                ));
                found.push(MatchCandidate::whole_value(
                    *term_id,
                    attr,
                    MatchMethod::Inferred,
                    path,
                ));
            }
        }
    }
    for candidate in found {
        state.add_match(candidate);
    }
    state
}

/// Cell lines imply the disease they were derived from
pub fn cell_line_to_implied_disease(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let rules = &ctx.resources.cell_line;
    let mut found = Vec::new();
    for m in state.matches() {
        if !ctx.resources.is_cell_line_term(&m.term_id, ctx.ontologies) {
            continue;
        }
        let mut diseases: Vec<&str> = rules
            .disease_relations
            .iter()
            .flat_map(|relation| ctx.ontologies.related(&m.term_id, relation))
            .collect();
        if let Some(listed) = rules.diseases.get(&m.term_id) {
            diseases.extend(listed.iter().map(|d| d.as_str()));
        }
        diseases.sort_unstable();
        diseases.dedup();

        for disease in diseases {
            if known_term(ctx, disease, "CellLineToImpliedDisease") {
                found.push(m.consequent(
                    disease,
                    MatchMethod::Consequent,
                    format!("CellLineToImpliedDisease: {} -> {}", m.term_id, disease),
                ));
            }
        }
    }
    for candidate in found {
        state.add_match(candidate);
    }
    state
}

/// Fixed term → term implications from the resource table
pub fn custom_consequent_terms(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for m in state.matches() {
        for implied in ctx.resources.custom_consequents_of(&m.term_id) {
            if known_term(ctx, implied, "CustomConsequentTerms") {
                found.push(m.consequent(
                    implied.clone(),
                    MatchMethod::Consequent,
                    format!("CustomConsequentTerms: {} -> {}", m.term_id, implied),
                ));
            }
        }
    }
    for candidate in found {
        state.add_match(candidate);
    }
    state
}

/// Follow the configured relations from matched cell lines (e.g. the cell
/// type a line derives from)
pub fn infer_cell_line_terms(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for m in state.matches() {
        if !ctx.resources.is_cell_line_term(&m.term_id, ctx.ontologies) {
            continue;
        }
        for relation in &ctx.resources.cell_line.inferred_relations {
            for target in ctx.ontologies.related(&m.term_id, relation) {
                if known_term(ctx, target, "InferCellLineTerms") {
                    found.push(m.consequent(
                        target,
                        MatchMethod::Consequent,
                        format!("InferCellLineTerms: {} {} {}", m.term_id, relation, target),
                    ));
                }
            }
        }
    }
    for candidate in found {
        state.add_match(candidate);
    }
    state
}

/// Age real values imply a developmental stage ("21 years" → adult)
pub fn implied_developmental_stage_from_age(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for rv in state.real_values() {
        let Some(years) = rv
            .unit_id
            .as_deref()
            .and_then(|id| ctx.resources.unit(id))
            .and_then(|unit| unit.years)
            .map(|factor| rv.value * factor)
        else {
            continue;
        };
        let Some(attr) = state.attribute(&rv.original_key) else {
            continue;
        };
        for rule in &ctx.resources.developmental_stages {
            if rule.property != rv.property_id || !rule.contains(years) {
                continue;
            }
            if !known_term(ctx, &rule.term, "ImpliedDevelopmentalStageFromAge") {
                continue;
            }
            let mut path = rv.path_to_mapping.clone();
            path.push(format!(
                "ImpliedDevelopmentalStageFromAge: {} years -> {}",
                years, rule.term
            ));
            found.push(MatchCandidate::whole_value(
                rule.term.clone(),
                attr,
                MatchMethod::Consequent,
                path,
            ));
        }
    }
    for candidate in found {
        state.add_match(candidate);
    }
    state
}

/// Samples of a cell line, or of a cell type grown in culture, are
/// cultured cells
pub fn consequent_cultured_cell(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let Some(rule) = &ctx.resources.cultured_cell else {
        return state;
    };
    if state.has_match(&rule.term) || !known_term(ctx, &rule.term, "ConsequentCulturedCell") {
        return state;
    }

    let text_matches = || state.matches().filter(|m| !m.is_consequent);
    let cell_line = text_matches().find(|m| ctx.resources.is_cell_line_term(&m.term_id, ctx.ontologies));
    let cultured = state
        .attributes
        .iter()
        .any(|a| rule.keys.contains(&a.key_norm()));
    let cell_type = text_matches()
        .find(|m| ctx.ontologies.is_strict_ancestor(&rule.cell_type_root, &m.term_id));

    let anchor = match (cell_line, cell_type) {
        (Some(line), _) => Some((line, "cell line")),
        (None, Some(cell)) if cultured => Some((cell, "cell type in culture")),
        _ => None,
    };
    let Some((anchor, reason)) = anchor else {
        return state;
    };

    let candidate = anchor.consequent(
        rule.term.clone(),
        MatchMethod::Consequent,
        format!("ConsequentCulturedCell: {} ({})", anchor.term_id, reason),
    );
    state.add_match(candidate);
    state
}
