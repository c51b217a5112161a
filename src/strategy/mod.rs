// Signal strategy: HTF trend, LTF entry, quality filters and confluence scoring
pub mod confluence;
pub mod filters;
pub mod htf_filter;
pub mod ltf_entry;

pub use confluence::{
    ConfluenceScorer, ScoreComponents, ScoreRejection, ScoreWeights, ScoredSetup, ScoringConfig,
    StopRule,
};
pub use filters::{
    FilterConfig, FilterKind, FilterReport, FilterResult, MarketContext, QualityFilters,
};
pub use htf_filter::{TrendDirection, TrendFilter, TrendFilterConfig, TrendState};
pub use ltf_entry::{EntryConfig, EntryDetector, EntryPattern, EntrySignalCandidate};
