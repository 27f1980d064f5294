use ctxvault_types::Record;
use serde::{Deserialize, Serialize};

use crate::tier::TemporalTier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub archived: usize,
}

impl TierDistribution {
    pub fn record(&mut self, tier: TemporalTier) {
        match tier {
            TemporalTier::Hot => self.hot += 1,
            TemporalTier::Warm => self.warm += 1,
            TemporalTier::Cold => self.cold += 1,
            TemporalTier::Archived => self.archived += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hot + self.warm + self.cold + self.archived
    }
}

/// Outcome statistics of one compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionMetrics {
    /// False when the log was under budget and returned verbatim.
    pub compacted: bool,
    pub original_count: usize,
    pub optimized_count: usize,
    pub original_bytes: usize,
    pub optimized_bytes: usize,
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    pub reduction_percent: f64,
    pub tier_distribution: TierDistribution,
    /// Distinct kinds among kept records.
    pub cluster_count: usize,
    pub mean_relevance: f64,
    pub pairs_corrected: usize,
    pub processing_ms: u64,
}

impl CompactionMetrics {
    pub fn passthrough(records: &[Record], processing_ms: u64) -> Self {
        let bytes = total_bytes(records);
        let tokens = total_tokens(records);
        Self {
            compacted: false,
            original_count: records.len(),
            optimized_count: records.len(),
            original_bytes: bytes,
            optimized_bytes: bytes,
            original_tokens: tokens,
            optimized_tokens: tokens,
            reduction_percent: 0.0,
            cluster_count: distinct_kinds(records),
            processing_ms,
            ..Default::default()
        }
    }
}

pub fn total_bytes(records: &[Record]) -> usize {
    records.iter().map(|r| r.estimated_size_bytes).sum()
}

pub fn total_tokens(records: &[Record]) -> usize {
    records.iter().map(|r| r.estimated_tokens()).sum()
}

pub fn distinct_kinds(records: &[Record]) -> usize {
    let mut kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds.dedup();
    kinds.len()
}

pub fn reduction_percent(original: usize, optimized: usize) -> f64 {
    if original == 0 {
        0.0
    } else {
        (1.0 - optimized as f64 / original as f64) * 100.0
    }
}
