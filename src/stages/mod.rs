//! Rule logic of each stage family.
//!
//! Every function takes the state by value and returns the transformed
//! state; [`crate::pipeline::Stage::apply`] dispatches to them.

pub mod conflicts;
pub mod consequents;
pub mod fuzzy;
pub mod matching;
pub mod real_value;
pub mod tokenize;
pub mod variants;

use crate::pipeline::StageContext;

/// True if some loaded ontology defines the term. Table entries naming
/// unknown terms are skipped.
pub(crate) fn known_term(ctx: &StageContext<'_>, term_id: &str, stage: &'static str) -> bool {
    let known = ctx.ontologies.contains(term_id);
    if !known {
        tracing::debug!(stage, term = %term_id, "unknown term referenced, skipping");
    }
    known
}
