use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Externally tracked access statistics for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessStats {
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Default for AccessStats {
    fn default() -> Self {
        Self {
            access_count: 1,
            last_accessed: None,
        }
    }
}

/// Inputs to one scoring pass.
///
/// `access` is keyed by record index and is only ever filled by callers;
/// the pipeline reads it and never updates it.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    pub active_files: Vec<String>,
    pub active_tools: Vec<String>,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub current_query: Option<String>,
    pub access: HashMap<usize, AccessStats>,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl ScoringContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            active_files: Vec::new(),
            active_tools: Vec::new(),
            session_id: None,
            task_id: None,
            current_query: None,
            access: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.current_query = Some(query.into());
        self
    }

    pub fn with_active_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn access_count(&self, index: usize) -> u32 {
        self.access
            .get(&index)
            .map(|a| a.access_count)
            .unwrap_or(1)
    }

    pub fn last_accessed(&self, index: usize) -> Option<DateTime<Utc>> {
        self.access.get(&index).and_then(|a| a.last_accessed)
    }
}
