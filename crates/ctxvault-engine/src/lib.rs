// Compaction engine - pure, single-threaded pipeline over an in-memory
// snapshot of a session log. Holds no store locks and caches nothing
// between passes.

pub mod compress;
pub mod context;
pub mod graph;
pub mod metrics;
pub mod options;
pub mod relevance;
pub mod selector;
pub mod similarity;
pub mod tier;

pub use compress::TemporalCompressor;
pub use context::{AccessStats, ScoringContext};
pub use graph::ImportanceGraph;
pub use metrics::{CompactionMetrics, TierDistribution};
pub use options::{CompactionOptions, CompressionStrategy};
pub use relevance::{RelevanceComponents, RelevanceScore, RelevanceScorer};
pub use selector::{BudgetSelector, SelectionOutcome, find_tool_pairs};
pub use similarity::{JaccardSimilarity, SimilarityProvider};
pub use tier::{TemporalTier, TierClassifier};

use ctxvault_types::Record;

// Façade API - stable entry point for the runtime layer

/// Reduce `records` to fit `options.target_bytes`.
///
/// Logs already under budget come back untouched, in order.
pub fn compact(
    records: Vec<Record>,
    context: &ScoringContext,
    options: &CompactionOptions,
) -> SelectionOutcome {
    BudgetSelector::new(options.clone()).select(records, context)
}
