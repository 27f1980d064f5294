mod deferred;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ctxvault_core::{SessionLogPath, recognize_session_log};
use ctxvault_engine::{CompactionMetrics, CompactionOptions, ScoringContext};
use ctxvault_index::AppendOutcome;
use ctxvault_types::{Record, serialize_records};
use serde::Serialize;

use crate::config::Config;
use crate::store::SessionStore;
use crate::{Error, Result};
use deferred::{DeferredBatch, DeferredQueue};

/// What happened to the store mirror of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendDisposition {
    /// Not a session log; only the file was written.
    Passthrough,
    /// Nothing but blank lines; only the file was written.
    Empty,
    Mirrored(AppendOutcome),
    /// First append to a log the store had never seen: the whole file,
    /// earlier lines included, was imported. Holds the imported line count.
    Imported(usize),
    /// The first import failed; the next read or append tries again.
    Unmirrored,
    /// Queued for background retry.
    Deferred,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterceptorStats {
    pub reads: u64,
    pub appends: u64,
    pub compactions: u64,
    pub fallbacks: u64,
    pub deferred: u64,
    pub pending_deferred: usize,
    pub last_metrics: Option<CompactionMetrics>,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    appends: AtomicU64,
    compactions: AtomicU64,
    fallbacks: AtomicU64,
    deferred: AtomicU64,
}

/// Read/append adapter in front of session log files.
///
/// Reads of a recognized log are served from the store and compacted to
/// the configured budget, but only while the stored lines match the file
/// line for line. Anything else falls back to the raw file. Appends always
/// reach the file first.
pub struct LogInterceptor {
    store: Arc<SessionStore>,
    roots: Vec<PathBuf>,
    options: CompactionOptions,
    retry_window: Duration,
    deferred: DeferredQueue,
    counters: Counters,
    last_metrics: Mutex<Option<CompactionMetrics>>,
}

impl LogInterceptor {
    pub fn new(store: Arc<SessionStore>, config: &Config) -> Result<Self> {
        let retry_window = config.interceptor.retry_window();
        let deferred = DeferredQueue::start(
            Arc::clone(&store),
            retry_window,
            config.interceptor.deferred_retry_max_backoff(),
        )?;

        Ok(Self {
            store,
            roots: config.interceptor.session_roots.clone(),
            options: config.compaction.clone(),
            retry_window,
            deferred,
            counters: Counters::default(),
            last_metrics: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn recognize(&self, path: &Path) -> Option<SessionLogPath> {
        recognize_session_log(path, &self.roots)
    }

    /// Contents to hand a reader of `path`.
    pub fn read(&self, path: &Path) -> Result<String> {
        let context = match self.recognize(path) {
            Some(log) => ScoringContext::default().with_session(log.session_id),
            None => ScoringContext::default(),
        };
        self.compact_path(path, &context)
    }

    /// Like [`read`](Self::read) with a caller-supplied scoring context.
    pub fn compact_path(&self, path: &Path, context: &ScoringContext) -> Result<String> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);

        let Some(log) = self.recognize(path) else {
            return Ok(std::fs::read_to_string(path)?);
        };

        if self.deferred.pending_for(&log.session_id) > 0 {
            tracing::debug!(session_id = %log.session_id, "deferred lines pending, serving raw log");
            return Ok(self.raw_fallback(std::fs::read_to_string(path)?));
        }
        if self.needs_import(&log) {
            self.import(&log, path);
        }

        let raw = std::fs::read_to_string(path)?;
        let records = match self.store.read(&log.session_id) {
            Ok(records) if mirrors_file(&records, &raw) => records,
            Ok(records) => {
                tracing::debug!(
                    session_id = %log.session_id,
                    stored = records.len(),
                    "stored lines out of step with log file, serving raw log"
                );
                return Ok(self.raw_fallback(raw));
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %log.session_id,
                    error = %err,
                    "store read failed, serving raw log"
                );
                return Ok(self.raw_fallback(raw));
            }
        };

        let outcome = ctxvault_engine::compact(records, context, &self.options);
        if outcome.metrics.compacted {
            self.counters.compactions.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                session_id = %log.session_id,
                original = outcome.metrics.original_count,
                kept = outcome.metrics.optimized_count,
                reduction = outcome.metrics.reduction_percent,
                "served compacted log"
            );
        }
        *self
            .last_metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.metrics);

        Ok(serialize_records(&outcome.records))
    }

    fn raw_fallback(&self, raw: String) -> String {
        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        raw
    }

    // Only a store that answers "no such session" triggers an import; a
    // failing store is left to the raw fallback.
    fn needs_import(&self, log: &SessionLogPath) -> bool {
        matches!(self.store.session_meta(&log.session_id), Ok(None))
    }

    fn import(&self, log: &SessionLogPath, path: &Path) -> Option<usize> {
        match self.store.import_file_with_timeout(
            &log.session_id,
            path,
            Some(log),
            self.retry_window,
        ) {
            Ok(imported) => Some(imported),
            Err(err) => {
                tracing::warn!(
                    session_id = %log.session_id,
                    error = %err,
                    "log file import failed"
                );
                None
            }
        }
    }

    /// Append `data` to the file, then mirror its lines into the store.
    ///
    /// Only a failed file write is an error. Store contention past the
    /// retry window queues the lines for a background retry. The first
    /// append to a non-empty log the store has never seen imports the
    /// whole file instead.
    pub fn append(&self, path: &Path, data: &str) -> Result<AppendDisposition> {
        self.counters.appends.fetch_add(1, Ordering::Relaxed);

        let log = self.recognize(path);
        let had_lines = log.is_some() && file_len(path) > 0;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(data.as_bytes())?;

        let Some(log) = log else {
            return Ok(AppendDisposition::Passthrough);
        };

        let lines: Vec<String> = data
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            return Ok(AppendDisposition::Empty);
        }

        // Earlier lines still waiting to be mirrored go first.
        if self.deferred.pending_for(&log.session_id) > 0 {
            return Ok(self.defer(log, lines));
        }

        if had_lines && self.needs_import(&log) {
            return Ok(match self.import(&log, path) {
                Some(imported) => AppendDisposition::Imported(imported),
                None => AppendDisposition::Unmirrored,
            });
        }

        match self
            .store
            .append_with_timeout(&log.session_id, &lines, Some(&log), self.retry_window)
        {
            Ok(outcome) => Ok(AppendDisposition::Mirrored(outcome)),
            Err(err @ Error::InvalidInput(_)) => Err(err),
            Err(err) => {
                tracing::warn!(
                    session_id = %log.session_id,
                    error = %err,
                    "store append failed, deferring"
                );
                Ok(self.defer(log, lines))
            }
        }
    }

    fn defer(&self, source: SessionLogPath, lines: Vec<String>) -> AppendDisposition {
        self.counters.deferred.fetch_add(1, Ordering::Relaxed);
        self.deferred.push(DeferredBatch { source, lines });
        AppendDisposition::Deferred
    }

    /// Drop the stored lines of the session behind `path`; the next read
    /// re-imports the file. Returns removed line count.
    pub fn clear_cache(&self, path: &Path) -> Result<usize> {
        match self.recognize(path) {
            Some(log) => self.store.clear_session(&log.session_id),
            None => Ok(0),
        }
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.pending()
    }

    pub fn stats(&self) -> InterceptorStats {
        InterceptorStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            appends: self.counters.appends.load(Ordering::Relaxed),
            compactions: self.counters.compactions.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
            pending_deferred: self.deferred.pending(),
            last_metrics: self
                .last_metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Stop the retry thread after a final attempt. The store stays open.
    pub fn shutdown(&self) {
        self.deferred.shutdown();
    }
}

impl Drop for LogInterceptor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Stored records are exactly the non-blank lines of `raw`, in order.
fn mirrors_file(records: &[Record], raw: &str) -> bool {
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
    !records.is_empty()
        && records
            .iter()
            .all(|record| lines.next() == Some(record.raw_line.as_str()))
        && lines.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxvault_types::parse_log;

    #[test]
    fn test_mirrors_file_requires_every_line() {
        let raw = "{\"a\":1}\n\n{\"b\":2}\n";
        let both = parse_log(raw);
        assert!(mirrors_file(&both, raw));
        assert!(!mirrors_file(&both[..1], raw));
        assert!(!mirrors_file(&both[1..], raw));
        assert!(!mirrors_file(&[], ""));

        let longer = format!("{}{{\"c\":3}}\n", raw);
        assert!(!mirrors_file(&both, &longer));
    }
}
