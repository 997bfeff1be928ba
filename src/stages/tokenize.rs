//! Attribute filtering and token-span construction.

use crate::pipeline::{MappingState, SpanKind, StageContext, TokenSpan};
use crate::text::{normalize_label, trimmed_range, word_spans};

/// Drop attributes that cannot carry a mapping: empty or placeholder
/// values and keys known to hold identifiers.
pub fn key_value_filter(mut state: MappingState, ctx: &StageContext<'_>) -> MappingState {
    state.attributes.retain(|attr| {
        let key_norm = attr.key_norm();
        let value_norm = normalize_label(&attr.value);
        let keep = !key_norm.is_empty()
            && !value_norm.is_empty()
            && !ctx.resources.is_placeholder(&value_norm)
            && !ctx.resources.is_ignored_key(&key_norm);
        if !keep {
            tracing::debug!(key = %attr.key, value = %attr.value, "filtered attribute");
        }
        keep
    });
    state
}

/// One span per attribute covering the whole trimmed value
pub fn init_key_value_tokens(mut state: MappingState) -> MappingState {
    for attr in &mut state.attributes {
        let (start, end) = trimmed_range(&attr.value);
        if start == end {
            continue;
        }
        let text = attr.slice(start, end).to_string();
        attr.push_span(TokenSpan::original(start, end, text, "InitKeyValueTokens"), "InitKeyValueTokens");
    }
    state
}

/// Every contiguous run of up to `max_len` words
pub fn ngram(mut state: MappingState, max_len: usize) -> MappingState {
    for attr in &mut state.attributes {
        let words = word_spans(&attr.value);
        let mut spans = Vec::new();
        for i in 0..words.len() {
            for n in 1..=max_len.min(words.len() - i) {
                let start = words[i].0;
                let end = words[i + n - 1].1;
                let text = attr.slice(start, end).to_string();
                spans.push(TokenSpan::original(start, end, text, format!("NGram: {}", n)));
            }
        }
        for span in spans {
            attr.push_span(span, "NGram");
        }
    }
    state
}

/// Lowercase every span's text in place
pub fn lowercase(mut state: MappingState) -> MappingState {
    for attr in &mut state.attributes {
        let spans = std::mem::take(&mut attr.spans);
        for mut span in spans {
            let lowered = span.text.to_lowercase();
            if lowered != span.text {
                span.text = lowered;
                span.path.push("Lowercase".to_string());
            }
            attr.push_span(span, "Lowercase");
        }
    }
    state
}

/// Split spans on `delimiter`.
///
/// Adds one span per non-empty part and one span for the whole region with
/// the delimiter replaced by a space. Existing spans are kept. Part offsets
/// come from the original value; a span is split only if its text is that
/// value slice or its lowercase form.
pub fn delimit(mut state: MappingState, delimiter: char) -> MappingState {
    let step = format!("Delimit: '{}'", delimiter);
    for attr in &mut state.attributes {
        let mut spans = Vec::new();
        for span in &attr.spans {
            if span.kind != SpanKind::Original {
                continue;
            }
            let original = attr.slice(span.start, span.end);
            if !original.contains(delimiter) {
                continue;
            }
            let lowered = if span.text == original {
                false
            } else if span.text == original.to_lowercase() {
                true
            } else {
                continue;
            };

            let joined = span
                .text
                .split(delimiter)
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            if !joined.is_empty() {
                spans.push(span.derive(joined, SpanKind::Original, step.clone()));
            }

            let mut offset = 0;
            for part in original.split(delimiter) {
                let (lead, trail) = trimmed_range(part);
                if lead < trail {
                    let text = &part[lead..trail];
                    let mut path = span.path.clone();
                    path.push(step.clone());
                    spans.push(TokenSpan {
                        start: span.start + offset + lead,
                        end: span.start + offset + trail,
                        text: if lowered { text.to_lowercase() } else { text.to_string() },
                        kind: SpanKind::Original,
                        path,
                    });
                }
                offset += part.len() + delimiter.len_utf8();
            }
        }
        for span in spans {
            attr.push_span(span, "Delimit");
        }
    }
    state
}
