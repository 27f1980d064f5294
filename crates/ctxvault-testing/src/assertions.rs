//! Custom assertions for compaction and store invariants.
//!
//! Each returns `Result` so failures carry a readable message through
//! `anyhow` instead of a bare `assert!` panic.

use anyhow::{Result, bail};
use ctxvault_types::{Record, RecordKind};
use serde_json::Value;
use std::collections::HashMap;

/// Both halves of every pair are kept, or neither is.
pub fn assert_pairs_kept_together(pairs: &[(usize, usize)], kept_indices: &[usize]) -> Result<()> {
    for &(use_idx, result_idx) in pairs {
        let use_kept = kept_indices.contains(&use_idx);
        let result_kept = kept_indices.contains(&result_idx);
        if use_kept != result_kept {
            bail!(
                "Tool pair ({}, {}) split: use kept={}, result kept={}",
                use_idx,
                result_idx,
                use_kept,
                result_kept
            );
        }
    }
    Ok(())
}

/// Tool ids a raw log line calls (`uses`) and answers (`results`), read
/// straight from the JSON rather than from the parsed record.
fn raw_tool_ids(line: &str) -> (Vec<String>, Vec<String>) {
    let mut uses = Vec::new();
    let mut results = Vec::new();
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return (uses, results);
    };
    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    match value.get("type").and_then(Value::as_str) {
        Some("tool_use") => uses.extend(str_field(&value, "id")),
        Some("tool_result") => results.extend(str_field(&value, "tool_use_id")),
        Some(side @ ("assistant" | "user")) => {
            let blocks = value
                .pointer("/message/content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for block in &blocks {
                match (side, block.get("type").and_then(Value::as_str)) {
                    ("assistant", Some("tool_use")) => uses.extend(str_field(block, "id")),
                    ("user", Some("tool_result")) => {
                        results.extend(str_field(block, "tool_use_id"))
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    (uses, results)
}

/// Every kept tool result has its calling line kept, and every kept call
/// line has all of its results kept. Calls and results are matched by the
/// ids in the raw JSON of `original`, block by block.
pub fn assert_tool_calls_answered(original: &[Record], kept_indices: &[usize]) -> Result<()> {
    let mut caller: HashMap<String, usize> = HashMap::new();
    let mut links = Vec::new();
    for (i, record) in original.iter().enumerate() {
        let (uses, results) = raw_tool_ids(&record.raw_line);
        for id in uses {
            caller.insert(id, i);
        }
        for id in results {
            if let Some(use_idx) = caller.remove(&id) {
                links.push((id, use_idx, i));
            }
        }
    }

    for (id, use_idx, result_idx) in links {
        let use_kept = kept_indices.contains(&use_idx);
        let result_kept = kept_indices.contains(&result_idx);
        if use_kept != result_kept {
            bail!(
                "Tool id {} split: call line {} kept={}, result line {} kept={}",
                id,
                use_idx,
                use_kept,
                result_idx,
                result_kept
            );
        }
    }
    Ok(())
}

/// Every summary in `original` appears byte-for-byte in `kept`.
pub fn assert_summaries_preserved(original: &[Record], kept: &[Record]) -> Result<()> {
    for summary in original.iter().filter(|r| r.kind == RecordKind::Summary) {
        if !kept.iter().any(|k| k.raw_line == summary.raw_line) {
            bail!("Summary dropped or altered: {}", summary.raw_line);
        }
    }
    Ok(())
}

/// Kept indices are strictly increasing (original order preserved).
pub fn assert_order_preserved(kept_indices: &[usize]) -> Result<()> {
    if let Some(w) = kept_indices.windows(2).find(|w| w[0] >= w[1]) {
        bail!("Order not preserved: index {} precedes {}", w[0], w[1]);
    }
    Ok(())
}

pub fn assert_within_budget(records: &[Record], target_bytes: usize) -> Result<()> {
    let total: usize = records.iter().map(|r| r.estimated_size_bytes).sum();
    if total > target_bytes {
        bail!("Kept {} bytes, budget was {}", total, target_bytes);
    }
    Ok(())
}

/// Store line numbers for one session are strictly increasing and unique.
pub fn assert_line_numbers_increasing(line_numbers: &[i64]) -> Result<()> {
    if let Some(w) = line_numbers.windows(2).find(|w| w[0] >= w[1]) {
        bail!("Line numbers not strictly increasing: {} then {}", w[0], w[1]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair_detected() {
        assert!(assert_pairs_kept_together(&[(0, 1)], &[0, 1, 2]).is_ok());
        assert!(assert_pairs_kept_together(&[(0, 1)], &[2]).is_ok());
        assert!(assert_pairs_kept_together(&[(0, 1)], &[1]).is_err());
    }

    #[test]
    fn test_second_block_of_multi_call_line_is_checked() {
        let original = crate::LogBuilder::new("s")
            .tool_uses(&[("a", "Read"), ("b", "Grep")])
            .tool_result("a", "1")
            .tool_result("b", "2")
            .records();

        assert!(assert_tool_calls_answered(&original, &[0, 1, 2]).is_ok());
        assert!(assert_tool_calls_answered(&original, &[]).is_ok());
        assert!(assert_tool_calls_answered(&original, &[2]).is_err());
        assert!(assert_tool_calls_answered(&original, &[0, 1]).is_err());
    }

    #[test]
    fn test_order() {
        assert!(assert_order_preserved(&[0, 2, 5]).is_ok());
        assert!(assert_order_preserved(&[0, 5, 2]).is_err());
        assert!(assert_line_numbers_increasing(&[1, 1]).is_err());
    }
}
