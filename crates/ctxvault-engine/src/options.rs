use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_BYTES: usize = 500_000;
pub const DEFAULT_KEEP_RECENT: usize = 50;
pub const DEFAULT_HOT_WINDOW_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_WARM_WINDOW_MS: u64 = 30 * 60 * 1000;

/// How selected records are shrunk before being charged to the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Truncate text by the record's tier ratio.
    #[default]
    Temporal,
    /// Keep records verbatim; only selection reduces the log.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionOptions {
    pub target_bytes: usize,
    pub keep_recent: usize,
    pub hot_window_ms: u64,
    pub warm_window_ms: u64,
    pub strategy: CompressionStrategy,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            target_bytes: DEFAULT_TARGET_BYTES,
            keep_recent: DEFAULT_KEEP_RECENT,
            hot_window_ms: DEFAULT_HOT_WINDOW_MS,
            warm_window_ms: DEFAULT_WARM_WINDOW_MS,
            strategy: CompressionStrategy::default(),
        }
    }
}

impl CompactionOptions {
    pub fn with_target_bytes(mut self, target_bytes: usize) -> Self {
        self.target_bytes = target_bytes;
        self
    }

    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }

    pub fn with_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn hot_window(&self) -> Duration {
        Duration::milliseconds(self.hot_window_ms as i64)
    }

    pub fn warm_window(&self) -> Duration {
        Duration::milliseconds(self.warm_window_ms as i64)
    }
}
