//! Alternate surface forms for existing spans.
//!
//! Variant spans cover the same region as the span they were derived from
//! and carry `SpanKind::Variant`; matches found on them are reported as
//! synonym matches. Originals are never removed.

use crate::pipeline::{MappingState, SpanKind, StageContext, TokenSpan};
use crate::text::normalize_label;

pub fn inflectional_variants(state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    expand_words(state, "InflectionalVariants", |word| {
        ctx.resources.inflection_bases(word)
    })
}

pub fn spelling_variants(state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    expand_words(state, "SpellingVariants", |word| {
        ctx.resources.spelling_variants_of(word)
    })
}

/// Whole-span replacements from the curated synonym table
pub fn manually_annotated_synonyms(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    for attr in &mut state.attributes {
        let mut spans = Vec::new();
        for span in &attr.spans {
            let phrase = normalize_label(&span.text);
            for synonym in ctx.resources.synonyms_of(&phrase) {
                spans.push(span.derive(
                    synonym.clone(),
                    SpanKind::Variant,
                    format!("ManuallyAnnotatedSynonyms: {} -> {}", phrase, synonym),
                ));
            }
        }
        for span in spans {
            attr.push_span(span, "ManuallyAnnotatedSynonyms");
        }
    }
    state
}

/// Expand acronyms. Only spans written without lowercase letters in the
/// original value are treated as acronyms ("HCC", not "hcc").
pub fn acronym_to_expansion(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    for attr in &mut state.attributes {
        let mut spans = Vec::new();
        for span in &attr.spans {
            let original = attr.slice(span.start, span.end);
            if !is_acronym(original) {
                continue;
            }
            let acronym = normalize_label(&span.text);
            for expansion in ctx.resources.acronym_expansions(&acronym) {
                spans.push(span.derive(
                    expansion.clone(),
                    SpanKind::Variant,
                    format!("AcronymToExpansion: {} -> {}", acronym, expansion),
                ));
            }
        }
        for span in spans {
            attr.push_span(span, "AcronymToExpansion");
        }
    }
    state
}

fn is_acronym(s: &str) -> bool {
    s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
}

/// Replace words of each span using a word → alternatives table.
///
/// Produces one variant per (word, alternative) pair, plus one variant with
/// every replaceable word swapped for its first alternative.
fn expand_words<'r>(
    mut state: MappingState,
    stage: &'static str,
    alternatives: impl Fn(&str) -> &'r [String],
) -> MappingState {
    for attr in &mut state.attributes {
        let mut spans: Vec<TokenSpan> = Vec::new();
        for span in &attr.spans {
            let words: Vec<String> = normalize_label(&span.text)
                .split(' ')
                .map(str::to_string)
                .collect();

            let mut all_replaced = words.clone();
            let mut replaced_words = 0;
            for (i, word) in words.iter().enumerate() {
                let options = alternatives(word);
                if let Some(first) = options.first() {
                    all_replaced[i] = first.clone();
                    replaced_words += 1;
                }
                for option in options {
                    let mut variant = words.clone();
                    variant[i] = option.clone();
                    spans.push(span.derive(
                        variant.join(" "),
                        SpanKind::Variant,
                        format!("{}: {} -> {}", stage, word, option),
                    ));
                }
            }
            if replaced_words > 1 {
                spans.push(span.derive(all_replaced.join(" "), SpanKind::Variant, stage.to_string()));
            }
        }
        for span in spans {
            attr.push_span(span, stage);
        }
    }
    state
}
