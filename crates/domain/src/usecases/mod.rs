//! Application use cases / business logic

pub mod cycle;
pub mod dedup;
pub mod filter;
pub mod render;
pub mod resolve;
pub mod select;

pub use cycle::{CycleConfig, CycleError, CycleOutcome, CycleRunner, CycleStage};
pub use dedup::{DedupGuard, Duplicate, OverlapIndex};
pub use filter::{FilterChain, Rejection};
pub use render::Formatter;
pub use resolve::SourceResolver;
pub use select::select_best;
