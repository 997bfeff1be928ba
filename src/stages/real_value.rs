//! Numeric property extraction ("21 years", "passage 4", "37 C").

use regex::Regex;
use std::sync::LazyLock;

use crate::pipeline::{MappingState, RealValueCandidate, StageContext};
use crate::resources::{PropertyDef, UnitDef};
use crate::text::normalize_label;

/// A single number optionally followed by a unit label
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?\d+(?:\.\d+)?)\s*-?\s*([^\d\s][^\d]*)?$").expect("quantity pattern is valid")
});

/// A number and the unit text that followed it, from a normalized value
fn parse_quantity(value_norm: &str) -> Option<(f64, Option<&str>)> {
    let caps = QUANTITY_RE.captures(value_norm)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2).map(|m| m.as_str().trim()).filter(|u| !u.is_empty());
    Some((number, unit))
}

fn resolve_unit<'r>(ctx: &StageContext<'r>, label: &str) -> Option<&'r UnitDef> {
    ctx.resources.unit_by_label(label).or_else(|| {
        label
            .strip_suffix(" old")
            .and_then(|stripped| ctx.resources.unit_by_label(stripped.trim_end()))
    })
}

/// Time quantities under time-valued keys ("age": "3 months").
///
/// The unit comes from the value or, for bare numbers, from the key
/// ("age (years)": "21"). Values without a recognizable time unit are left
/// for [`extract_real_value`].
pub fn parse_time_with_unit(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        let Some((property, key_unit)) = ctx.resources.property_for_key(&attr.key_norm()) else {
            continue;
        };
        if !property.time {
            continue;
        }
        let value_norm = normalize_label(&attr.value);
        let Some((value, unit_label)) = parse_quantity(&value_norm) else {
            tracing::debug!(key = %attr.key, value = %attr.value, "no time quantity in value");
            continue;
        };
        let unit = match unit_label {
            Some(label) => resolve_unit(ctx, label),
            None => key_unit,
        };
        let Some(unit) = unit.filter(|u| u.is_time()) else {
            tracing::debug!(key = %attr.key, value = %attr.value, "time value without time unit");
            continue;
        };
        found.push(candidate(
            property,
            Some(unit),
            value,
            &attr.key,
            format!("ParseTimeWithUnit: '{}'", value_norm),
        ));
    }
    for rv in found {
        state.add_real_value(rv);
    }
    state
}

/// Numeric values under any key recognized as a quantitative property.
///
/// Keys that already have a real value are skipped.
pub fn extract_real_value(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    let mut found = Vec::new();
    for attr in &state.attributes {
        if state.has_real_value_for_key(&attr.key) {
            continue;
        }
        let Some((property, key_unit)) = ctx.resources.property_for_key(&attr.key_norm()) else {
            continue;
        };
        let value_norm = normalize_label(&attr.value);
        let Some((value, unit_label)) = parse_quantity(&value_norm) else {
            tracing::debug!(key = %attr.key, value = %attr.value, "unparseable numeric value");
            continue;
        };
        let unit = match unit_label {
            Some(label) => match resolve_unit(ctx, label) {
                Some(unit) => Some(unit),
                None => {
                    tracing::debug!(key = %attr.key, unit = label, "unknown unit");
                    continue;
                }
            },
            None => key_unit.or_else(|| {
                property
                    .default_unit
                    .as_deref()
                    .and_then(|id| ctx.resources.unit(id))
            }),
        };
        if property.time && unit.is_some_and(|u| !u.is_time()) {
            continue;
        }
        found.push(candidate(
            property,
            unit,
            value,
            &attr.key,
            format!("ExtractRealValue: '{}'", value_norm),
        ));
    }
    for rv in found {
        state.add_real_value(rv);
    }
    state
}

fn candidate(
    property: &PropertyDef,
    unit: Option<&UnitDef>,
    value: f64,
    key: &str,
    step: String,
) -> RealValueCandidate {
    RealValueCandidate {
        property_id: property.id.clone(),
        unit_id: unit.map(|u| u.id.clone()),
        value,
        original_key: key.to_string(),
        consequent: false,
        path_to_mapping: vec![step],
    }
}
