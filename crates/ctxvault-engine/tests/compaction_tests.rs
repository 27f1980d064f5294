use chrono::{Duration, TimeZone, Utc};
use ctxvault_engine::{
    CompactionOptions, CompressionStrategy, RelevanceScorer, ScoringContext, TemporalTier,
    TierClassifier, compact, find_tool_pairs,
};
use ctxvault_testing::LogBuilder;
use ctxvault_testing::assertions::{
    assert_order_preserved, assert_pairs_kept_together, assert_summaries_preserved,
    assert_tool_calls_answered, assert_within_budget,
};
use ctxvault_types::{Record, RecordKind};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 10, 12, 0, 0).unwrap()
}

#[test]
fn test_under_budget_log_passes_through() {
    let records = LogBuilder::new("s-a")
        .starting_at(now() - Duration::minutes(1))
        .summary("earlier work")
        .user("hi")
        .assistant("hello")
        .user("next")
        .assistant("sure")
        .user("done")
        .assistant("bye")
        .records();

    let options = CompactionOptions::default().with_target_bytes(1_000_000);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

    assert_eq!(outcome.records, records);
    assert_eq!(outcome.kept_indices, (0..records.len()).collect::<Vec<_>>());
    assert!(!outcome.metrics.compacted);
    assert_eq!(outcome.metrics.reduction_percent, 0.0);
    assert_eq!(outcome.metrics.original_count, outcome.metrics.optimized_count);
}

#[test]
fn test_large_hot_log_is_trimmed_to_budget() {
    let mut log = LogBuilder::new("s-b")
        .starting_at(now() - Duration::seconds(250))
        .step(Duration::seconds(1));
    for i in 0..200 {
        log = if i % 40 == 0 { log.summary(&format!("summary {}", i)) } else { log };
        log = if i % 2 == 0 {
            log.user_sized(5_000)
        } else {
            log.assistant_sized(5_000)
        };
    }
    let records = log.records();
    assert_eq!(records.iter().filter(|r| r.kind == RecordKind::Summary).count(), 5);
    let total: usize = records.iter().map(|r| r.estimated_size_bytes).sum();
    assert!(total > 900_000);

    let options = CompactionOptions::default()
        .with_target_bytes(500_000)
        .with_keep_recent(50);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);
    let metrics = &outcome.metrics;

    assert!(metrics.compacted);
    assert!(metrics.optimized_count < metrics.original_count);
    assert!(metrics.optimized_tokens < metrics.original_tokens);
    assert!(metrics.reduction_percent > 0.0);
    assert_eq!(metrics.tier_distribution.hot, records.len());

    assert_summaries_preserved(&records, &outcome.records).unwrap();
    assert_order_preserved(&outcome.kept_indices).unwrap();
    assert_within_budget(&outcome.records, 500_000).unwrap();

    // The 50 most recent turns are present and byte-identical (Hot tier).
    let recent: Vec<usize> = records
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, r)| r.kind.is_conversation())
        .take(50)
        .map(|(i, _)| i)
        .collect();
    for i in recent {
        let pos = outcome
            .kept_indices
            .iter()
            .position(|k| *k == i)
            .unwrap_or_else(|| panic!("recent record {} dropped", i));
        assert_eq!(outcome.records[pos].raw_line, records[i].raw_line);
    }

    // Greedy fill took more than the protected set.
    assert!(outcome.records.len() > 55);
}

#[test]
fn test_old_records_are_compressed() {
    let records = LogBuilder::new("s-old")
        .starting_at(now() - Duration::hours(3))
        .step(Duration::seconds(1))
        .user_sized(4_000)
        .assistant_sized(4_000)
        .user_sized(4_000)
        .records();

    let options = CompactionOptions::default()
        .with_target_bytes(5_000)
        .with_keep_recent(1);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

    assert_eq!(outcome.metrics.tier_distribution.cold, 3);
    // The protected record is Cold, so it is kept but shrunk.
    let last = outcome.kept_indices.iter().position(|i| *i == 2).unwrap();
    assert!(outcome.records[last].estimated_size_bytes < records[2].estimated_size_bytes);
    assert!(outcome.records[last].raw_line.contains("..."));
    assert_within_budget(&outcome.records, 5_000).unwrap();
}

#[test]
fn test_strategy_none_never_rewrites() {
    let records = LogBuilder::new("s-none")
        .starting_at(now() - Duration::hours(3))
        .user_sized(4_000)
        .assistant_sized(4_000)
        .user_sized(4_000)
        .records();

    let options = CompactionOptions::default()
        .with_target_bytes(9_000)
        .with_keep_recent(1)
        .with_strategy(CompressionStrategy::None);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

    for (record, idx) in outcome.records.iter().zip(&outcome.kept_indices) {
        assert_eq!(record, &records[*idx]);
    }
}

#[test]
fn test_split_tool_pair_is_dropped() {
    // The fresh result outranks its stale call and fits; the call does not,
    // so the greedy pass splits the pair and both must go.
    let records = LogBuilder::new("s-pair")
        .starting_at(now() - Duration::seconds(30))
        .user_sized(3_000)
        .raw(&format!(
            r#"{{"type":"assistant","timestamp":"{}","message":{{"content":[{{"type":"tool_use","id":"toolu_big","name":"Read","input":{{"blob":"{}"}}}}]}}}}"#,
            (now() - Duration::hours(3)).to_rfc3339(),
            "x".repeat(8_000)
        ))
        .tool_result("toolu_big", "contents")
        .records();
    assert_eq!(records[1].kind, RecordKind::ToolUse);
    assert_eq!(records[2].kind, RecordKind::ToolResult);

    let options = CompactionOptions::default()
        .with_target_bytes(5_000)
        .with_keep_recent(1);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

    assert_eq!(outcome.metrics.pairs_corrected, 1);
    assert!(!outcome.kept_indices.contains(&1));
    assert!(!outcome.kept_indices.contains(&2));
    assert_pairs_kept_together(&find_tool_pairs(&records), &outcome.kept_indices).unwrap();
}

#[test]
fn test_multi_call_line_keeps_all_results_together() {
    // One line calls A and B. A's result is too big for the budget, so the
    // call line has to go, and B's small result with it.
    let records = LogBuilder::new("s-multi")
        .starting_at(now() - Duration::seconds(30))
        .tool_uses(&[("toolu_a", "Read"), ("toolu_b", "Grep")])
        .tool_result("toolu_a", &"x".repeat(6_000))
        .tool_result("toolu_b", "short")
        .user("thanks")
        .records();
    assert_eq!(records[0].tool_ids, vec!["toolu_a", "toolu_b"]);

    let options = CompactionOptions::default()
        .with_target_bytes(2_000)
        .with_keep_recent(1);
    let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

    assert_eq!(outcome.kept_indices, vec![3]);
    assert_tool_calls_answered(&records, &outcome.kept_indices).unwrap();
    assert_pairs_kept_together(&find_tool_pairs(&records), &outcome.kept_indices).unwrap();
}

#[test]
fn test_scores_bounded_and_weighted() {
    let records: Vec<Record> = LogBuilder::new("s-score")
        .starting_at(now() - Duration::minutes(20))
        .step(Duration::minutes(2))
        .user("refactor the parser in src/parser.rs")
        .tool_pair("Read", "fn parse() {}")
        .file_snapshot(&["src/parser.rs"])
        .summary("parser work")
        .system("context compacted")
        .queue_op("queued prompt")
        .raw("not json at all")
        .records();

    let context = ScoringContext::at(now())
        .with_query("parser refactor")
        .with_active_files(["src/parser.rs"]);
    let scores = RelevanceScorer::default().score(&records, &context);

    assert_eq!(scores.len(), records.len());
    for score in scores.values() {
        assert!((0.0..=1.0).contains(&score.overall));
        assert!((0.0..=1.0).contains(&score.confidence));
        assert!((score.components.weighted().clamp(0.0, 1.0) - score.overall).abs() < 1e-9);
    }
}

#[test]
fn test_tiers_never_reach_archived_by_age() {
    let classifier = TierClassifier::default();
    let ancient = LogBuilder::new("s")
        .starting_at(now() - Duration::days(400))
        .user("old")
        .records();
    assert_eq!(classifier.classify(&ancient[0], None, now()), TemporalTier::Cold);
}

mod pairing_property {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Turn(usize),
        Pair(usize),
        Summary,
        /// One line calling several tools, each answered on its own line.
        FanOut(Vec<usize>),
        /// Several call lines answered together on one line.
        FanIn(usize, usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (50usize..3_000).prop_map(Step::Turn),
            (50usize..3_000).prop_map(Step::Pair),
            Just(Step::Summary),
            prop::collection::vec(50usize..4_000, 2..4).prop_map(Step::FanOut),
            (2usize..4, 50usize..4_000).prop_map(|(calls, size)| Step::FanIn(calls, size)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn pairs_survive_or_vanish_together(
            steps in prop::collection::vec(step(), 1..40),
            budget in 1_000usize..40_000,
            keep_recent in 0usize..6,
            age_minutes in 0i64..120,
        ) {
            let mut log = LogBuilder::new("prop")
                .starting_at(now() - Duration::minutes(age_minutes))
                .step(Duration::seconds(5));
            let mut next_id = 0usize;
            let mut fresh_id = || {
                next_id += 1;
                format!("toolu_{}", next_id)
            };
            for step in &steps {
                log = match step {
                    Step::Turn(size) => log.user_sized(*size),
                    Step::Pair(size) => log.tool_pair("Bash", &"o".repeat(*size)),
                    Step::Summary => log.summary("checkpoint"),
                    Step::FanOut(sizes) => {
                        let ids: Vec<String> = sizes.iter().map(|_| fresh_id()).collect();
                        let calls: Vec<(&str, &str)> =
                            ids.iter().map(|id| (id.as_str(), "Read")).collect();
                        let mut log = log.tool_uses(&calls);
                        for (id, size) in ids.iter().zip(sizes) {
                            log = log.tool_result(id, &"o".repeat(*size));
                        }
                        log
                    }
                    Step::FanIn(calls, size) => {
                        let ids: Vec<String> = (0..*calls).map(|_| fresh_id()).collect();
                        let output = "o".repeat(*size);
                        let mut log = log;
                        for id in &ids {
                            log = log.tool_use(id, "Grep");
                        }
                        let results: Vec<(&str, &str)> =
                            ids.iter().map(|id| (id.as_str(), output.as_str())).collect();
                        log.tool_results(&results)
                    }
                };
            }
            let records = log.records();

            let options = CompactionOptions::default()
                .with_target_bytes(budget)
                .with_keep_recent(keep_recent);
            let outcome = compact(records.clone(), &ScoringContext::at(now()), &options);

            let answered = assert_tool_calls_answered(&records, &outcome.kept_indices);
            prop_assert!(answered.is_ok(), "{:?}", answered);
            prop_assert!(assert_order_preserved(&outcome.kept_indices).is_ok());
            prop_assert!(assert_summaries_preserved(&records, &outcome.records).is_ok());
            for (record, idx) in outcome.records.iter().zip(&outcome.kept_indices) {
                prop_assert!(record.estimated_size_bytes <= records[*idx].estimated_size_bytes);
                prop_assert_eq!(record.kind, records[*idx].kind);
            }
        }
    }
}
