use chrono::{DateTime, Duration, Utc};
use ctxvault_types::{Record, RecordKind};
use serde::{Deserialize, Serialize};

use crate::options::CompactionOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalTier {
    Hot,
    Warm,
    Cold,
    /// Defined with its own ratio and decay but not produced by the age
    /// thresholds; reserved for an eviction policy.
    Archived,
}

impl TemporalTier {
    pub fn compression_ratio(&self) -> f64 {
        match self {
            TemporalTier::Hot => 1.0,
            TemporalTier::Warm => 0.7,
            TemporalTier::Cold => 0.3,
            TemporalTier::Archived => 0.1,
        }
    }

    pub fn decay_multiplier(&self) -> f64 {
        match self {
            TemporalTier::Hot => 1.0,
            TemporalTier::Warm => 0.8,
            TemporalTier::Cold => 0.5,
            TemporalTier::Archived => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalTier::Hot => "hot",
            TemporalTier::Warm => "warm",
            TemporalTier::Cold => "cold",
            TemporalTier::Archived => "archived",
        }
    }
}

/// Assigns tiers from age and last access.
#[derive(Debug, Clone, Copy)]
pub struct TierClassifier {
    hot_window: Duration,
    warm_window: Duration,
}

impl Default for TierClassifier {
    fn default() -> Self {
        Self::from_options(&CompactionOptions::default())
    }
}

impl TierClassifier {
    pub fn new(hot_window: Duration, warm_window: Duration) -> Self {
        Self {
            hot_window,
            warm_window,
        }
    }

    pub fn from_options(options: &CompactionOptions) -> Self {
        Self::new(options.hot_window(), options.warm_window())
    }

    /// Records without a timestamp are treated as brand new.
    pub fn classify(
        &self,
        record: &Record,
        last_accessed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> TemporalTier {
        if let Some(accessed) = last_accessed
            && now - accessed < self.hot_window
        {
            return TemporalTier::Hot;
        }

        let age = record.timestamp.map(|ts| now - ts).unwrap_or_else(Duration::zero);
        if age < self.hot_window {
            TemporalTier::Hot
        } else if age < self.warm_window {
            TemporalTier::Warm
        } else {
            TemporalTier::Cold
        }
    }

    /// Effective ratio for a record; summaries are never compressed.
    pub fn compression_ratio(record: &Record, tier: TemporalTier) -> f64 {
        if record.kind == RecordKind::Summary {
            1.0
        } else {
            tier.compression_ratio()
        }
    }
}
