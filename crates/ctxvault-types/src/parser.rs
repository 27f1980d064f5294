use chrono::{DateTime, Utc};
use std::path::Path;

use crate::Result;
use crate::record::{Record, RecordKind};
use crate::schema::{ContentBlock, MessageContent, MessageLine, RawRecord, value_text};

/// Parse a single log line into a [`Record`].
///
/// Never fails: invalid JSON, non-object lines, and unrecognized `type`
/// values all come back as `RecordKind::Unknown` with the line preserved.
pub fn parse_record(line: &str) -> Record {
    let raw: RawRecord = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(_) => return Record::unknown(line),
    };

    let mut record = Record::unknown(line);

    match raw {
        RawRecord::User(msg) => apply_message(&mut record, msg, RecordKind::User),
        RawRecord::Assistant(msg) => apply_message(&mut record, msg, RecordKind::Assistant),
        RawRecord::Summary(line) => {
            record.kind = RecordKind::Summary;
            record.identifier = line.leaf_uuid;
            record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);
            record.text = line.summary.unwrap_or_default();
        }
        RawRecord::System(line) => {
            record.kind = RecordKind::System;
            record.identifier = line.uuid;
            record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);
            record.text = line.content.as_ref().map(value_text).unwrap_or_default();
        }
        RawRecord::FileHistorySnapshot(line) => {
            record.kind = RecordKind::FileSnapshot;
            record.identifier = line.message_id;
            let snapshot_ts = line.snapshot.as_ref().and_then(|s| s.timestamp.clone());
            record.timestamp = line
                .timestamp
                .or(snapshot_ts)
                .as_deref()
                .and_then(parse_timestamp);

            if let Some(snapshot) = line.snapshot {
                let mut paths: Vec<String> = snapshot
                    .tracked_file_backups
                    .map(|backups| backups.into_iter().map(|(k, _)| k).collect())
                    .unwrap_or_default();

                for file in &snapshot.files {
                    let path = match file {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Object(map) => map
                            .get("path")
                            .and_then(|p| p.as_str())
                            .map(str::to_string),
                        _ => None,
                    };
                    if let Some(path) = path
                        && !paths.contains(&path)
                    {
                        paths.push(path);
                    }
                }
                record.text = paths.join(" ");
                record.referenced_paths = paths;
            }
        }
        RawRecord::QueueOperation(line) => {
            record.kind = RecordKind::QueueOp;
            record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);
            record.text = line.content.as_ref().map(value_text).unwrap_or_default();
        }
        RawRecord::ToolUse(line) => {
            record.kind = RecordKind::ToolUse;
            record.tool_ids = line.id.iter().cloned().collect();
            record.identifier = line.id;
            record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);
            record.text = tool_use_text(line.name.as_deref(), &line.input);
        }
        RawRecord::ToolResult(line) => {
            record.kind = RecordKind::ToolResult;
            record.tool_ids = line.tool_use_id.iter().cloned().collect();
            record.identifier = line.tool_use_id;
            record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);
            record.text = line.content.as_ref().map(value_text).unwrap_or_default();
        }
        RawRecord::Unknown => {}
    }

    record
}

fn apply_message(record: &mut Record, line: MessageLine, base: RecordKind) {
    record.kind = base;
    record.identifier = line.uuid;
    record.timestamp = line.timestamp.as_deref().and_then(parse_timestamp);

    let Some(content) = line.message.and_then(|m| m.content) else {
        return;
    };

    match content {
        MessageContent::Text(text) => record.text = text,
        MessageContent::Blocks(blocks) => {
            let mut texts = Vec::new();
            let mut use_ids = Vec::new();
            let mut result_ids = Vec::new();
            let mut has_use = false;
            let mut has_result = false;

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text),
                    ContentBlock::ToolUse { id, name, input } => {
                        texts.push(tool_use_text(name.as_deref(), &input));
                        has_use = true;
                        use_ids.extend(id);
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        if let Some(content) = content.as_ref() {
                            texts.push(value_text(content));
                        }
                        has_result = true;
                        result_ids.extend(tool_use_id);
                    }
                    ContentBlock::Other => {}
                }
            }

            // Tool blocks are only meaningful on the side of the exchange
            // that produces them.
            let promoted = match base {
                RecordKind::Assistant if has_use => Some((RecordKind::ToolUse, use_ids)),
                RecordKind::User if has_result => Some((RecordKind::ToolResult, result_ids)),
                _ => None,
            };
            if let Some((kind, ids)) = promoted {
                record.kind = kind;
                record.identifier = ids.first().cloned();
                record.tool_ids = ids;
            }

            record.text = texts
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
        }
    }
}

fn tool_use_text(name: Option<&str>, input: &serde_json::Value) -> String {
    let input = if input.is_null() {
        String::new()
    } else {
        input.to_string()
    };
    match name {
        Some(name) if input.is_empty() => name.to_string(),
        Some(name) => format!("{} {}", name, input),
        None => input,
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a whole line-delimited log. Blank lines are skipped.
pub fn parse_log(text: &str) -> Vec<Record> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_record)
        .collect()
}

/// Serialize records back into the line-delimited format, one `raw_line`
/// per line with a trailing newline.
pub fn serialize_records(records: &[Record]) -> String {
    let capacity = records.iter().map(|r| r.raw_line.len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for record in records {
        out.push_str(&record.raw_line);
        out.push('\n');
    }
    out
}

pub fn read_log_file(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_log(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_user_message() {
        let line = r#"{"type":"user","uuid":"u-1","timestamp":"2025-12-10T10:00:00Z","message":{"role":"user","content":"fix the parser"}}"#;
        let record = parse_record(line);

        assert_eq!(record.kind, RecordKind::User);
        assert_eq!(record.identifier.as_deref(), Some("u-1"));
        assert_eq!(record.text, "fix the parser");
        assert!(record.timestamp.is_some());
        assert_eq!(record.estimated_size_bytes, line.len());
    }

    #[test]
    fn test_assistant_tool_use_is_promoted() {
        let line = r#"{"type":"assistant","uuid":"a-1","message":{"role":"assistant","content":[{"type":"text","text":"reading"},{"type":"tool_use","id":"toolu_01","name":"Read","input":{"file_path":"/src/main.rs"}}]}}"#;
        let record = parse_record(line);

        assert_eq!(record.kind, RecordKind::ToolUse);
        assert_eq!(record.identifier.as_deref(), Some("toolu_01"));
        assert!(record.text.contains("reading"));
        assert!(record.text.contains("/src/main.rs"));
    }

    #[test]
    fn test_user_tool_result_is_promoted() {
        let line = r#"{"type":"user","uuid":"u-2","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_01","content":"fn main() {}"}]}}"#;
        let record = parse_record(line);

        assert_eq!(record.kind, RecordKind::ToolResult);
        assert_eq!(record.identifier.as_deref(), Some("toolu_01"));
        assert_eq!(record.text, "fn main() {}");
    }

    #[test]
    fn test_every_tool_block_id_is_collected() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_a","name":"Read"},{"type":"text","text":"and"},{"type":"tool_use","id":"toolu_b","name":"Grep"}]}}"#;
        let record = parse_record(line);
        assert_eq!(record.kind, RecordKind::ToolUse);
        assert_eq!(record.identifier.as_deref(), Some("toolu_a"));
        assert_eq!(record.tool_ids, vec!["toolu_a", "toolu_b"]);

        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_a","content":"1"},{"type":"tool_result","tool_use_id":"toolu_b","content":"2"}]}}"#;
        let record = parse_record(line);
        assert_eq!(record.kind, RecordKind::ToolResult);
        assert_eq!(record.tool_ids, vec!["toolu_a", "toolu_b"]);
    }

    #[test]
    fn test_plain_messages_carry_no_tool_ids() {
        let record = parse_record(r#"{"type":"user","uuid":"u-1","message":{"content":"hi"}}"#);
        assert!(record.tool_ids.is_empty());

        // A tool_result block on the assistant side is not promoted.
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_x"}]}}"#;
        let record = parse_record(line);
        assert_eq!(record.kind, RecordKind::Assistant);
        assert!(record.tool_ids.is_empty());
    }

    #[test]
    fn test_file_snapshot_paths() {
        let line = r#"{"type":"file-history-snapshot","messageId":"m-1","snapshot":{"trackedFileBackups":{"src/lib.rs":{}},"files":["src/main.rs",{"path":"src/lib.rs"}]}}"#;
        let record = parse_record(line);

        assert_eq!(record.kind, RecordKind::FileSnapshot);
        assert_eq!(record.referenced_paths, vec!["src/lib.rs", "src/main.rs"]);
    }

    #[test]
    fn test_unparsable_lines_become_unknown() {
        for line in ["{not json", "42", r#"{"type":"mystery","x":1}"#, r#"{"no_type":true}"#] {
            let record = parse_record(line);
            assert_eq!(record.kind, RecordKind::Unknown, "line: {}", line);
            assert_eq!(record.raw_line, line);
        }
    }

    #[test]
    fn test_parse_log_skips_blank_lines() {
        let text = "{\"type\":\"summary\",\"summary\":\"s\"}\n\n{\"type\":\"system\",\"content\":\"c\"}\n";
        let records = parse_log(text);
        assert_eq!(records.len(), 2);
        assert_eq!(serialize_records(&records), text.replace("\n\n", "\n"));
    }
}
