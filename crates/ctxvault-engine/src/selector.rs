use ctxvault_types::{Record, RecordKind};
use std::collections::HashMap;
use std::time::Instant;

use crate::compress::TemporalCompressor;
use crate::context::ScoringContext;
use crate::graph::ImportanceGraph;
use crate::metrics::{
    CompactionMetrics, TierDistribution, distinct_kinds, reduction_percent, total_bytes,
    total_tokens,
};
use crate::options::CompactionOptions;
use crate::relevance::RelevanceScorer;
use crate::similarity::SimilarityProvider;
use crate::tier::{TemporalTier, TierClassifier};

const RELEVANCE_SHARE: f64 = 0.5;
const DECAY_SHARE: f64 = 0.2;
const IMPORTANCE_SHARE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// Kept records in original order, possibly compressed.
    pub records: Vec<Record>,
    /// Input index of each kept record.
    pub kept_indices: Vec<usize>,
    pub metrics: CompactionMetrics,
}

/// Combines relevance, tier decay and graph importance into one ranking and
/// fills a byte budget with it.
pub struct BudgetSelector {
    options: CompactionOptions,
    scorer: RelevanceScorer,
    classifier: TierClassifier,
    compressor: TemporalCompressor,
}

impl BudgetSelector {
    pub fn new(options: CompactionOptions) -> Self {
        Self {
            classifier: TierClassifier::from_options(&options),
            compressor: TemporalCompressor::new(options.strategy),
            scorer: RelevanceScorer::default(),
            options,
        }
    }

    pub fn with_similarity(mut self, provider: Box<dyn SimilarityProvider>) -> Self {
        self.scorer = RelevanceScorer::new(provider);
        self
    }

    pub fn options(&self) -> &CompactionOptions {
        &self.options
    }

    pub fn select(&self, records: Vec<Record>, context: &ScoringContext) -> SelectionOutcome {
        let started = Instant::now();

        if total_bytes(&records) < self.options.target_bytes {
            let metrics = CompactionMetrics::passthrough(&records, elapsed_ms(started));
            let kept_indices = (0..records.len()).collect();
            return SelectionOutcome {
                records,
                kept_indices,
                metrics,
            };
        }

        let scores = self.scorer.score(&records, context);
        let tiers: Vec<TemporalTier> = records
            .iter()
            .enumerate()
            .map(|(i, r)| self.classifier.classify(r, context.last_accessed(i), context.now))
            .collect();
        let importance = ImportanceGraph::compute(&records);

        let mut tier_distribution = TierDistribution::default();
        for tier in &tiers {
            tier_distribution.record(*tier);
        }

        let mut selected: Vec<Option<Record>> = vec![None; records.len()];
        let mut used = 0usize;

        for (i, record) in records.iter().enumerate() {
            if record.kind.is_must_keep() {
                used += record.estimated_size_bytes;
                selected[i] = Some(record.clone());
            }
        }

        let mut ranked: Vec<(usize, f64)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.kind.is_must_keep())
            .map(|(i, _)| {
                let relevance = scores.get(&i).map(|s| s.overall).unwrap_or(0.0);
                let combined = RELEVANCE_SHARE * relevance
                    + DECAY_SHARE * tiers[i].decay_multiplier()
                    + IMPORTANCE_SHARE * importance[i];
                (i, combined)
            })
            .collect();

        let recent: Vec<usize> = records
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, r)| r.kind.is_conversation())
            .take(self.options.keep_recent)
            .map(|(i, _)| i)
            .collect();
        for i in recent {
            let compressed = self.compressor.compress(&records[i], tiers[i]);
            used += compressed.estimated_size_bytes;
            selected[i] = Some(compressed);
        }

        // Ties go to the later record.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));
        for (i, _) in ranked {
            if selected[i].is_some() {
                continue;
            }
            let compressed = self.compressor.compress(&records[i], tiers[i]);
            if used + compressed.estimated_size_bytes > self.options.target_bytes {
                break;
            }
            used += compressed.estimated_size_bytes;
            selected[i] = Some(compressed);
        }

        let pairs = find_tool_pairs(&records);
        let pairs_corrected = enforce_pairs(&pairs, &mut selected);
        if pairs_corrected > 0 {
            tracing::debug!(pairs_corrected, "dropped half-kept tool pairs");
        }

        let mut kept = Vec::new();
        let mut kept_indices = Vec::new();
        for (i, slot) in selected.into_iter().enumerate() {
            if let Some(record) = slot {
                kept.push(record);
                kept_indices.push(i);
            }
        }

        let mean_relevance = if kept_indices.is_empty() {
            0.0
        } else {
            kept_indices
                .iter()
                .filter_map(|i| scores.get(i).map(|s| s.overall))
                .sum::<f64>()
                / kept_indices.len() as f64
        };

        let original_bytes = total_bytes(&records);
        let optimized_bytes = total_bytes(&kept);
        let metrics = CompactionMetrics {
            compacted: true,
            original_count: records.len(),
            optimized_count: kept.len(),
            original_bytes,
            optimized_bytes,
            original_tokens: total_tokens(&records),
            optimized_tokens: total_tokens(&kept),
            reduction_percent: reduction_percent(original_bytes, optimized_bytes),
            tier_distribution,
            cluster_count: distinct_kinds(&kept),
            mean_relevance,
            pairs_corrected,
            processing_ms: elapsed_ms(started),
        };

        tracing::debug!(
            session_id = context.session_id.as_deref().unwrap_or("-"),
            original = metrics.original_count,
            kept = metrics.optimized_count,
            reduction = format!("{:.1}%", metrics.reduction_percent),
            elapsed_ms = metrics.processing_ms,
            "compacted session log"
        );

        SelectionOutcome {
            records: kept,
            kept_indices,
            metrics,
        }
    }
}

/// Locate ToolUse → ToolResult pairs: by shared tool id first, then by
/// immediate adjacency for whatever is still unpaired.
///
/// A line carrying several tool blocks pairs once per id, so one call can
/// appear in several pairs and one result line can answer several calls.
pub fn find_tool_pairs(records: &[Record]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut paired = vec![false; records.len()];
    let mut pending: HashMap<&str, usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        match record.kind {
            RecordKind::ToolUse => {
                for id in &record.tool_ids {
                    pending.insert(id.as_str(), i);
                }
            }
            RecordKind::ToolResult => {
                for id in &record.tool_ids {
                    let Some(use_idx) = pending.remove(id.as_str()) else {
                        continue;
                    };
                    if !pairs.contains(&(use_idx, i)) {
                        pairs.push((use_idx, i));
                    }
                    paired[use_idx] = true;
                    paired[i] = true;
                }
            }
            _ => {}
        }
    }

    for i in 1..records.len() {
        if records[i - 1].kind == RecordKind::ToolUse
            && records[i].kind == RecordKind::ToolResult
            && !paired[i - 1]
            && !paired[i]
        {
            pairs.push((i - 1, i));
            paired[i - 1] = true;
            paired[i] = true;
        }
    }

    pairs
}

/// Connected components of the pair graph, each sorted by index. Every
/// member of a group is kept or none is.
fn tool_groups(pairs: &[(usize, usize)], len: usize) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..len).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for &(a, b) in pairs {
        let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
        if ra != rb {
            parent[rb.max(ra)] = ra.min(rb);
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in pairs {
        for i in [a, b] {
            let members = groups.entry(root(&mut parent, i)).or_default();
            if !members.contains(&i) {
                members.push(i);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
    for group in &mut groups {
        group.sort_unstable();
    }
    groups.sort_unstable();
    groups
}

// Drop the kept part of any split group. Never resurrects dropped members,
// since that could push the selection over budget.
fn enforce_pairs(pairs: &[(usize, usize)], selected: &mut [Option<Record>]) -> usize {
    let mut corrected = 0;
    for group in tool_groups(pairs, selected.len()) {
        let kept = group.iter().filter(|&&i| selected[i].is_some()).count();
        if kept > 0 && kept < group.len() {
            for i in group {
                selected[i] = None;
            }
            corrected += 1;
        }
    }
    corrected
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
