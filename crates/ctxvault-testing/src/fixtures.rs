//! Session log fixtures.
//!
//! `LogBuilder` emits lines in the same shape Claude Code writes them, with a
//! monotonically advancing clock so tier classification is predictable.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use ctxvault_types::{Record, parse_log};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Fluent builder for session logs.
///
/// # Example
/// ```
/// use ctxvault_testing::LogBuilder;
///
/// let lines = LogBuilder::new("s-1")
///     .user("list the files")
///     .tool_pair("Bash", "a.rs\nb.rs")
///     .assistant("two files")
///     .build();
/// assert_eq!(lines.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct LogBuilder {
    session_id: String,
    clock: Option<DateTime<Utc>>,
    step: Duration,
    lines: Vec<String>,
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self::new("test-session")
    }
}

impl LogBuilder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            clock: Some(Utc::now()),
            step: Duration::seconds(1),
            lines: Vec::new(),
        }
    }

    /// Start the clock at `ts`; each line advances it by the step.
    pub fn starting_at(mut self, ts: DateTime<Utc>) -> Self {
        self.clock = Some(ts);
        self
    }

    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Emit subsequent lines without a `timestamp` field.
    pub fn untimed(mut self) -> Self {
        self.clock = None;
        self
    }

    pub fn user(self, text: &str) -> Self {
        let message = json!({ "role": "user", "content": text });
        self.message("user", message)
    }

    pub fn assistant(self, text: &str) -> Self {
        let message = json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": text }],
        });
        self.message("assistant", message)
    }

    /// User message whose serialized line is roughly `bytes` long.
    pub fn user_sized(self, bytes: usize) -> Self {
        let text = filler(bytes);
        self.user(&text)
    }

    pub fn assistant_sized(self, bytes: usize) -> Self {
        let text = filler(bytes);
        self.assistant(&text)
    }

    pub fn summary(mut self, text: &str) -> Self {
        let line = json!({
            "type": "summary",
            "summary": text,
            "leafUuid": Uuid::new_v4().to_string(),
        });
        self.lines.push(line.to_string());
        self
    }

    pub fn system(mut self, text: &str) -> Self {
        let mut line = json!({
            "type": "system",
            "uuid": Uuid::new_v4().to_string(),
            "sessionId": self.session_id,
            "content": text,
        });
        self.stamp(&mut line);
        self.lines.push(line.to_string());
        self
    }

    pub fn tool_use(self, id: &str, name: &str) -> Self {
        let message = json!({
            "role": "assistant",
            "content": [{
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": { "command": "run" },
            }],
        });
        self.message("assistant", message)
    }

    pub fn tool_result(self, id: &str, output: &str) -> Self {
        let message = json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": id,
                "content": output,
            }],
        });
        self.message("user", message)
    }

    /// One assistant line carrying a `tool_use` block per `(id, name)`.
    pub fn tool_uses(self, calls: &[(&str, &str)]) -> Self {
        let blocks: Vec<Value> = calls
            .iter()
            .map(|(id, name)| {
                json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": { "command": "run" },
                })
            })
            .collect();
        let message = json!({ "role": "assistant", "content": blocks });
        self.message("assistant", message)
    }

    /// One user line carrying a `tool_result` block per `(id, output)`.
    pub fn tool_results(self, results: &[(&str, &str)]) -> Self {
        let blocks: Vec<Value> = results
            .iter()
            .map(|(id, output)| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": output,
                })
            })
            .collect();
        let message = json!({ "role": "user", "content": blocks });
        self.message("user", message)
    }

    /// Tool call followed by its result, under a fresh `toolu_` id.
    pub fn tool_pair(self, name: &str, output: &str) -> Self {
        let id = format!("toolu_{}", Uuid::new_v4().simple());
        self.tool_use(&id, name).tool_result(&id, output)
    }

    pub fn file_snapshot(mut self, paths: &[&str]) -> Self {
        let backups: serde_json::Map<String, Value> = paths
            .iter()
            .map(|p| (p.to_string(), json!({ "version": 1 })))
            .collect();
        let mut line = json!({
            "type": "file-history-snapshot",
            "messageId": Uuid::new_v4().to_string(),
            "snapshot": { "trackedFileBackups": backups },
        });
        self.stamp(&mut line);
        self.lines.push(line.to_string());
        self
    }

    pub fn queue_op(mut self, content: &str) -> Self {
        let mut line = json!({
            "type": "queue-operation",
            "operation": "enqueue",
            "sessionId": self.session_id,
            "content": content,
        });
        self.stamp(&mut line);
        self.lines.push(line.to_string());
        self
    }

    /// Append a line verbatim.
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn build(self) -> Vec<String> {
        self.lines
    }

    pub fn records(self) -> Vec<Record> {
        parse_log(&self.to_text())
    }

    pub fn to_text(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_text())?;
        Ok(())
    }

    fn message(mut self, kind: &str, message: Value) -> Self {
        let mut line = json!({
            "type": kind,
            "uuid": Uuid::new_v4().to_string(),
            "sessionId": self.session_id,
            "message": message,
        });
        self.stamp(&mut line);
        self.lines.push(line.to_string());
        self
    }

    fn stamp(&mut self, line: &mut Value) {
        if let Some(ts) = self.clock {
            line["timestamp"] = Value::String(ts.to_rfc3339());
            self.clock = Some(ts + self.step);
        }
    }
}

// Line overhead (type, uuid, sessionId, timestamp) is roughly 200 bytes.
fn filler(bytes: usize) -> String {
    let words = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
    let mut text = String::with_capacity(bytes);
    let mut i = 0;
    while text.len() + 200 < bytes {
        text.push_str(words[i % words.len()]);
        text.push(' ');
        i += 1;
    }
    text
}
