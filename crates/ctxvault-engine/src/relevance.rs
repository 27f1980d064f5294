use ctxvault_types::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::context::ScoringContext;
use crate::similarity::{JaccardSimilarity, SimilarityProvider};

// Fixed convex combination; sums to 1.0.
pub const WEIGHT_RECENCY: f64 = 0.25;
pub const WEIGHT_FREQUENCY: f64 = 0.10;
pub const WEIGHT_SEMANTIC: f64 = 0.25;
pub const WEIGHT_ATTENTION: f64 = 0.30;
pub const WEIGHT_EXPERT: f64 = 0.10;

pub const RECENCY_HALF_LIFE_MS: f64 = 300_000.0;

const SEMANTIC_BASE: f64 = 0.5;
const FILE_OVERLAP_BONUS: f64 = 0.3;
const FILE_OVERLAP_CAP: usize = 3;
const QUERY_OVERLAP_BONUS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceComponents {
    pub recency: f64,
    pub frequency: f64,
    pub semantic: f64,
    pub attention: f64,
    pub expert: f64,
}

impl RelevanceComponents {
    pub fn weighted(&self) -> f64 {
        WEIGHT_RECENCY * self.recency
            + WEIGHT_FREQUENCY * self.frequency
            + WEIGHT_SEMANTIC * self.semantic
            + WEIGHT_ATTENTION * self.attention
            + WEIGHT_EXPERT * self.expert
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub overall: f64,
    pub components: RelevanceComponents,
    pub confidence: f64,
}

/// Structural weight of a record kind.
pub fn attention_weight(kind: RecordKind) -> f64 {
    match kind {
        RecordKind::Summary => 0.95,
        RecordKind::System => 0.90,
        RecordKind::User => 0.80,
        RecordKind::Assistant => 0.70,
        RecordKind::ToolUse => 0.60,
        RecordKind::ToolResult => 0.55,
        RecordKind::FileSnapshot => 0.50,
        RecordKind::Unknown => 0.20,
        RecordKind::QueueOp => 0.10,
    }
}

/// Domain weight of a record kind.
pub fn expert_weight(kind: RecordKind) -> f64 {
    match kind {
        RecordKind::Summary => 0.90,
        RecordKind::System => 0.85,
        RecordKind::ToolUse => 0.70,
        RecordKind::ToolResult => 0.65,
        RecordKind::User | RecordKind::Assistant => 0.60,
        RecordKind::FileSnapshot => 0.50,
        RecordKind::Unknown => 0.30,
        RecordKind::QueueOp => 0.10,
    }
}

/// Multi-factor relevance scorer. Pure function of its inputs.
pub struct RelevanceScorer {
    similarity: Box<dyn SimilarityProvider>,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(Box::new(JaccardSimilarity))
    }
}

impl RelevanceScorer {
    pub fn new(similarity: Box<dyn SimilarityProvider>) -> Self {
        Self { similarity }
    }

    pub fn score(
        &self,
        records: &[Record],
        context: &ScoringContext,
    ) -> HashMap<usize, RelevanceScore> {
        let total = records.len();
        records
            .iter()
            .enumerate()
            .map(|(index, record)| (index, self.score_one(record, index, total, context)))
            .collect()
    }

    pub fn score_one(
        &self,
        record: &Record,
        index: usize,
        total: usize,
        context: &ScoringContext,
    ) -> RelevanceScore {
        let components = RelevanceComponents {
            recency: recency(record, index, total, context),
            frequency: frequency(context.access_count(index)),
            semantic: self.semantic(record, context),
            attention: attention_weight(record.kind),
            expert: expert_weight(record.kind),
        };

        let mut confidence: f64 = 0.5;
        if record.timestamp.is_some() {
            confidence += 0.2;
        }
        if record.identifier.is_some() {
            confidence += 0.1;
        }
        if components.semantic > 0.6 {
            confidence += 0.1;
        }
        if components.attention > 0.7 {
            confidence += 0.1;
        }

        RelevanceScore {
            overall: components.weighted().clamp(0.0, 1.0),
            components,
            confidence: confidence.min(1.0),
        }
    }

    fn semantic(&self, record: &Record, context: &ScoringContext) -> f64 {
        let mut score = SEMANTIC_BASE;

        if record.kind == RecordKind::FileSnapshot && !context.active_files.is_empty() {
            let matches = record
                .referenced_paths
                .iter()
                .filter(|path| {
                    context
                        .active_files
                        .iter()
                        .any(|active| path.contains(active.as_str()) || active.contains(path.as_str()))
                })
                .count();
            score += FILE_OVERLAP_BONUS * matches.min(FILE_OVERLAP_CAP) as f64
                / FILE_OVERLAP_CAP as f64;
        }

        if let Some(query) = context.current_query.as_deref()
            && !record.text.is_empty()
        {
            let overlap = self.similarity.score(query, &record.text).clamp(0.0, 1.0);
            score += QUERY_OVERLAP_BONUS * overlap;
        }

        score.min(1.0)
    }
}

fn recency(record: &Record, index: usize, total: usize, context: &ScoringContext) -> f64 {
    match record.timestamp {
        Some(ts) => {
            let age_ms = (context.now - ts).num_milliseconds().max(0) as f64;
            0.5f64.powf(age_ms / RECENCY_HALF_LIFE_MS)
        }
        None if total > 0 => (index + 1) as f64 / total as f64,
        None => 1.0,
    }
}

fn frequency(access_count: u32) -> f64 {
    ((access_count as f64 + 1.0).log10() / 2.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ctxvault_types::parse_record;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 10, 12, 0, 0).unwrap()
    }

    fn user_at(ts: chrono::DateTime<Utc>, text: &str) -> Record {
        parse_record(&format!(
            r#"{{"type":"user","uuid":"u","timestamp":"{}","message":{{"content":"{}"}}}}"#,
            ts.to_rfc3339(),
            text
        ))
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_RECENCY + WEIGHT_FREQUENCY + WEIGHT_SEMANTIC + WEIGHT_ATTENTION + WEIGHT_EXPERT;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_recency_half_life() {
        let scorer = RelevanceScorer::default();
        let ctx = ScoringContext::at(now());
        let fresh = scorer.score_one(&user_at(now(), "x"), 0, 2, &ctx);
        let old = scorer.score_one(&user_at(now() - Duration::minutes(5), "x"), 1, 2, &ctx);

        assert!((fresh.components.recency - 1.0).abs() < 1e-9);
        assert!((old.components.recency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_recency_falls_back_to_position() {
        let scorer = RelevanceScorer::default();
        let ctx = ScoringContext::at(now());
        let record = parse_record(r#"{"type":"user","message":{"content":"no ts"}}"#);

        let score = scorer.score_one(&record, 3, 8, &ctx);
        assert!((score.components.recency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_default_frequency() {
        assert!((frequency(1) - 2f64.log10() / 2.0).abs() < 1e-12);
        assert_eq!(frequency(10_000), 1.0);
    }

    #[test]
    fn test_query_overlap_raises_semantic() {
        let scorer = RelevanceScorer::default();
        let ctx = ScoringContext::at(now()).with_query("fix the tokenizer panic");

        let related = scorer.score_one(&user_at(now(), "the tokenizer panic on empty input"), 0, 2, &ctx);
        let unrelated = scorer.score_one(&user_at(now(), "update readme badges"), 1, 2, &ctx);

        assert!(related.components.semantic > unrelated.components.semantic);
        assert!(related.components.semantic <= 0.7 + 1e-9);
    }

    #[test]
    fn test_file_snapshot_overlap() {
        let scorer = RelevanceScorer::default();
        let ctx = ScoringContext::at(now()).with_active_files(["src/lib.rs", "src/main.rs"]);
        let record = parse_record(
            r#"{"type":"file-history-snapshot","messageId":"m","snapshot":{"files":["/repo/src/lib.rs","/repo/src/main.rs","/repo/README.md"]}}"#,
        );

        let score = scorer.score_one(&record, 0, 1, &ctx);
        assert!((score.components.semantic - (0.5 + 0.3 * 2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_accumulates() {
        let scorer = RelevanceScorer::default();
        let ctx = ScoringContext::at(now());

        let full = scorer.score_one(&user_at(now(), "x"), 0, 1, &ctx);
        // 0.5 + timestamp 0.2 + identifier 0.1 + attention 0.8 > 0.7 => 0.9
        assert!((full.confidence - 0.9).abs() < 1e-9);

        let bare = scorer.score_one(&Record::unknown("??"), 0, 1, &ctx);
        assert!((bare.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_and_system_rank_highest() {
        for kind in RecordKind::ALL {
            assert!(attention_weight(kind) <= attention_weight(RecordKind::Summary));
            assert!(attention_weight(kind) >= attention_weight(RecordKind::QueueOp));
            assert!(expert_weight(kind) <= expert_weight(RecordKind::Summary));
            assert!(expert_weight(kind) >= expert_weight(RecordKind::QueueOp));
        }
    }
}
