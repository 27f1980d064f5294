use ctxvault_types::Record;
use serde::{Deserialize, Serialize};

/// One persisted log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub session_id: String,
    /// 1-based, strictly increasing within a session.
    pub line_number: i64,
    /// `RecordKind::as_str` at insert time.
    pub kind: String,
    pub raw_line: String,
    /// RFC 3339, when the line carried one.
    pub timestamp: Option<String>,
    pub owning_pid: i64,
}

/// Liveness row for a session hosted by some OS process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub session_id: String,
    pub owning_pid: i64,
    pub host: String,
    pub file_path: Option<String>,
    pub project_name: Option<String>,
    /// Unix epoch milliseconds.
    pub last_heartbeat: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub lock_key: String,
    pub owning_pid: i64,
    /// Unix epoch milliseconds.
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: i64,
    pub session_id: String,
    pub summary: String,
    /// Highest line number the summary covers.
    pub through_line: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub file_path: Option<String>,
    pub project_name: Option<String>,
    pub first_seen: i64,
    pub last_updated: i64,
    pub entry_count: i64,
    pub total_bytes: i64,
    pub max_line_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub sessions: i64,
    pub entries: i64,
    pub total_bytes: i64,
    pub active_sessions: i64,
    pub locks: i64,
    pub summaries: i64,
}

/// Input to [`Database::append_entries`](crate::Database::append_entries).
#[derive(Debug, Clone)]
pub struct AppendBatch<'a> {
    pub session_id: &'a str,
    pub records: &'a [Record],
    pub owning_pid: i64,
    pub host: &'a str,
    pub file_path: Option<&'a str>,
    pub project_name: Option<&'a str>,
    pub now_ms: i64,
    /// Registrations with a heartbeat older than this may be taken over.
    pub stale_before_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub first_line: i64,
    pub last_line: i64,
    pub inserted: usize,
    /// False when another live process kept the registration.
    pub claimed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    pub deactivated: usize,
    pub locks_removed: usize,
}

/// Result row of `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub busy: bool,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}
