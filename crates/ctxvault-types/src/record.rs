use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of record kinds found in a session log.
///
/// Anything the parser does not recognize lands in `Unknown`, so scoring and
/// tiering tables can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Assistant,
    Summary,
    System,
    FileSnapshot,
    QueueOp,
    ToolUse,
    ToolResult,
    Unknown,
}

impl RecordKind {
    pub const ALL: [RecordKind; 9] = [
        RecordKind::User,
        RecordKind::Assistant,
        RecordKind::Summary,
        RecordKind::System,
        RecordKind::FileSnapshot,
        RecordKind::QueueOp,
        RecordKind::ToolUse,
        RecordKind::ToolResult,
        RecordKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Assistant => "assistant",
            RecordKind::Summary => "summary",
            RecordKind::System => "system",
            RecordKind::FileSnapshot => "file_snapshot",
            RecordKind::QueueOp => "queue_op",
            RecordKind::ToolUse => "tool_use",
            RecordKind::ToolResult => "tool_result",
            RecordKind::Unknown => "unknown",
        }
    }

    /// Kinds the selector keeps regardless of budget.
    pub fn is_must_keep(&self) -> bool {
        matches!(self, RecordKind::Summary | RecordKind::System)
    }

    /// User/assistant turns, the only kinds protected by the recent-keep window.
    pub fn is_conversation(&self) -> bool {
        matches!(self, RecordKind::User | RecordKind::Assistant)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .unwrap_or(RecordKind::Unknown);
        Ok(kind)
    }
}

/// One line of a session log, parsed.
///
/// `raw_line` is the source of truth: every other field is derived from it,
/// which is what makes `parse(serialize(record)) == record` hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub raw_line: String,
    pub kind: RecordKind,
    pub timestamp: Option<DateTime<Utc>>,
    /// Tool-use id for ToolUse/ToolResult, message uuid otherwise.
    pub identifier: Option<String>,
    /// Every tool-use id a ToolUse/ToolResult line carries, in block order.
    /// `identifier` is the first of them.
    #[serde(default)]
    pub tool_ids: Vec<String>,
    pub referenced_paths: Vec<String>,
    /// Flattened textual content, used for query overlap.
    pub text: String,
    pub estimated_size_bytes: usize,
}

impl Record {
    pub fn unknown(raw_line: impl Into<String>) -> Self {
        let raw_line = raw_line.into();
        Self {
            estimated_size_bytes: raw_line.len(),
            raw_line,
            kind: RecordKind::Unknown,
            timestamp: None,
            identifier: None,
            tool_ids: Vec::new(),
            referenced_paths: Vec::new(),
            text: String::new(),
        }
    }

    /// Rough token estimate (4 bytes per token).
    pub fn estimated_tokens(&self) -> usize {
        self.estimated_size_bytes.div_ceil(4)
    }

    pub fn is_tool(&self) -> bool {
        matches!(self.kind, RecordKind::ToolUse | RecordKind::ToolResult)
    }
}
