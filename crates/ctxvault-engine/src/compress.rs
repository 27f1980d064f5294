use ctxvault_types::{Record, RecordKind, parse_record};
use serde_json::Value;

use crate::options::CompressionStrategy;
use crate::tier::{TemporalTier, TierClassifier};

pub const TRUNCATION_MARKER: &str = "...";

// Keys whose string values carry free text. Identifiers, types and
// timestamps are never touched.
const TEXT_FIELDS: &[&str] = &["text", "content", "thinking", "output", "stdout", "stderr"];

/// Shrinks records by their tier's compression ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalCompressor {
    strategy: CompressionStrategy,
}

impl TemporalCompressor {
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Never grows a record and never touches a Summary.
    pub fn compress(&self, record: &Record, tier: TemporalTier) -> Record {
        if self.strategy == CompressionStrategy::None || record.kind == RecordKind::Summary {
            return record.clone();
        }

        let ratio = TierClassifier::compression_ratio(record, tier);
        if ratio >= 1.0 {
            return record.clone();
        }

        let line = match structured_truncate(&record.raw_line, ratio) {
            Some(line) => line,
            None => raw_truncate(&record.raw_line, ratio),
        };

        if line.len() < record.raw_line.len() {
            parse_record(&line)
        } else {
            record.clone()
        }
    }
}

fn structured_truncate(raw: &str, ratio: f64) -> Option<String> {
    let mut value: Value = serde_json::from_str(raw).ok()?;
    truncate_value(&mut value, ratio);
    let line = serde_json::to_string(&value).ok()?;
    // Only accept output that still parses as a log line.
    serde_json::from_str::<Value>(&line).ok()?;
    Some(line)
}

fn truncate_value(value: &mut Value, ratio: f64) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if let Value::String(s) = child {
                    if TEXT_FIELDS.contains(&key.as_str())
                        && let Some(short) = truncate_text(s, ratio)
                    {
                        *s = short;
                    }
                } else {
                    truncate_value(child, ratio);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                truncate_value(item, ratio);
            }
        }
        _ => {}
    }
}

/// `floor(len * ratio)` characters plus the marker, or `None` when that
/// would not be shorter than the input.
pub fn truncate_text(text: &str, ratio: f64) -> Option<String> {
    let chars = text.chars().count();
    let keep = (chars as f64 * ratio).floor() as usize;
    if keep + TRUNCATION_MARKER.len() >= chars {
        return None;
    }

    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    Some(out)
}

fn raw_truncate(raw: &str, ratio: f64) -> String {
    truncate_text(raw, ratio).unwrap_or_else(|| raw.to_string())
}
