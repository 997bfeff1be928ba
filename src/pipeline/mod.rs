//! Pipeline framework: per-sample state, the stage enum, the cross-sample
//! cache and the runner that ties them together.

mod cache;
mod runner;
mod stage;
mod state;

pub use cache::{AttributeFragment, CacheStats, QueryCache};
pub use runner::{Pipeline, PipelineResult};
pub use stage::{Stage, StageContext, StageScope};
pub use state::{
    Attribute, MappingState, MatchCandidate, MatchKey, MatchMethod, RealValueCandidate, SpanKind, TokenSpan,
};
