mod flusher;
mod heartbeat;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use ctxvault_core::{SessionLogPath, hostname};
use ctxvault_index::{
    AppendBatch, AppendOutcome, Database, EntryRecord, ReapOutcome, RegistrationRecord,
    SessionMeta, StoreStats, SummaryRecord,
};
use ctxvault_types::{Record, parse_record};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::{Error, Result};
use flusher::Flusher;
use heartbeat::Heartbeat;

const LOCK_BACKOFF_START: Duration = Duration::from_millis(5);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(100);

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn session_lock_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Store-wide figures plus the on-disk footprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    #[serde(flatten)]
    pub counts: StoreStats,
    pub file_bytes: u64,
    pub wal_bytes: u64,
    pub flush_pending: bool,
}

/// State shared with the background threads.
pub(crate) struct StoreInner {
    db: Mutex<Database>,
    path: PathBuf,
    pid: i64,
    host: String,
    config: StoreConfig,
    owned: Mutex<HashSet<String>>,
    pending: AtomicBool,
}

impl StoreInner {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owned(&self) -> MutexGuard<'_, HashSet<String>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stale_before(&self, now: i64) -> i64 {
        now - self.config.stale_timeout_ms as i64
    }

    /// Refresh every owned registration. Failures are logged and dropped.
    pub(crate) fn beat_owned(&self) {
        let sessions: Vec<String> = self.owned().iter().cloned().collect();
        for session_id in sessions {
            self.beat(&session_id);
        }
    }

    fn beat(&self, session_id: &str) -> bool {
        let result = self
            .db()
            .heartbeat(session_id, self.pid, &self.host, now_ms());
        match result {
            Ok(true) => true,
            Ok(false) => {
                // Another process took the registration over.
                tracing::debug!(session_id, pid = self.pid, "registration lost");
                self.owned().remove(session_id);
                false
            }
            Err(err) => {
                tracing::debug!(session_id, error = %err, "heartbeat failed");
                false
            }
        }
    }

    fn reap(&self) -> Result<ReapOutcome> {
        let now = now_ms();
        let outcome = self.db().reap_stale(self.stale_before(now), now)?;
        if outcome.deactivated > 0 || outcome.locks_removed > 0 {
            tracing::info!(
                deactivated = outcome.deactivated,
                locks_removed = outcome.locks_removed,
                "reaped stale sessions"
            );
        }
        Ok(outcome)
    }

    /// Checkpoint the journal if a flush is pending. An incomplete
    /// checkpoint leaves the flush pending.
    pub(crate) fn flush_pending(&self) -> Result<()> {
        if !self.pending.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let outcome = match self.db().checkpoint() {
            Ok(outcome) => outcome,
            Err(err) => {
                self.pending.store(true, Ordering::SeqCst);
                return Err(Error::Persistence(err.to_string()));
            }
        };

        if outcome.busy || outcome.checkpointed_frames < outcome.log_frames {
            self.pending.store(true, Ordering::SeqCst);
            return Err(Error::Persistence(format!(
                "checkpoint incomplete ({} of {} frames)",
                outcome.checkpointed_frames, outcome.log_frames
            )));
        }

        tracing::debug!(frames = outcome.log_frames, "store flushed");
        Ok(())
    }

    fn try_lock(&self, key: &str, ttl_ms: i64) -> Result<bool> {
        Ok(self.db().try_acquire_lock(key, self.pid, now_ms(), ttl_ms)?)
    }

    /// Take `key`, retrying with backoff until `timeout` elapses.
    fn acquire_with_retry(&self, key: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let mut backoff = LOCK_BACKOFF_START;

        loop {
            if self.try_lock(key, self.config.lock_ttl_ms as i64)? {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= timeout {
                tracing::warn!(key, waited_ms = waited.as_millis() as u64, "lock timeout");
                return Err(Error::LockTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            tracing::debug!(key, backoff_ms = backoff.as_millis() as u64, "lock contended");
            std::thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
        }
    }

    fn release(&self, key: &str) {
        if let Err(err) = self.db().release_lock(key, self.pid) {
            tracing::warn!(key, error = %err, "failed to release lock");
        }
    }

    /// Run `f` while holding the advisory lock `key`. The lock is released
    /// whether or not `f` succeeds.
    fn with_lock<T>(
        &self,
        key: &str,
        timeout: Duration,
        f: impl FnOnce(&mut Database) -> Result<T>,
    ) -> Result<T> {
        self.acquire_with_retry(key, timeout)?;
        let result = {
            let mut db = self.db();
            f(&mut db)
        };
        self.release(key);
        result
    }
}

/// Per-process handle on the shared session store file.
///
/// Owns one SQLite connection, a heartbeat thread for the sessions this
/// process registered, and a debounced flusher. [`SessionStore::shutdown`]
/// (also run on drop) stops both threads, completes any pending flush and
/// marks this process's registrations inactive.
pub struct SessionStore {
    inner: Arc<StoreInner>,
    heartbeat: Mutex<Option<Heartbeat>>,
    flusher: Mutex<Option<Flusher>>,
    closed: AtomicBool,
}

impl SessionStore {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Self::open_with_identity(path, config, std::process::id() as i64, hostname())
    }

    /// Open the store at `config.path`, or the default data-dir location.
    pub fn open_default(config: &StoreConfig) -> Result<Self> {
        let path = config.resolve_path()?;
        Self::open(&path, config)
    }

    /// Open with an explicit owner identity instead of this process's.
    pub fn open_with_identity(
        path: &Path,
        config: &StoreConfig,
        pid: i64,
        host: impl Into<String>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open_with_timeout(path, config.busy_timeout())?;
        let inner = Arc::new(StoreInner {
            db: Mutex::new(db),
            path: path.to_path_buf(),
            pid,
            host: host.into(),
            config: config.clone(),
            owned: Mutex::new(HashSet::new()),
            pending: AtomicBool::new(false),
        });

        if let Err(err) = inner.reap() {
            tracing::warn!(error = %err, "initial reap failed");
        }

        // A zero interval disables the timer; heartbeats then only happen
        // through appends and explicit `heartbeat` calls.
        let heartbeat = if config.heartbeat_interval_ms > 0 {
            Some(Heartbeat::start(
                Arc::clone(&inner),
                config.heartbeat_interval(),
            )?)
        } else {
            None
        };
        let flusher = Flusher::start(Arc::clone(&inner), config.flush_debounce())?;

        tracing::debug!(path = %path.display(), pid, "session store opened");

        Ok(Self {
            inner,
            heartbeat: Mutex::new(heartbeat),
            flusher: Mutex::new(Some(flusher)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn pid(&self) -> i64 {
        self.inner.pid
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn schedule_flush(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        if let Some(flusher) = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            flusher.schedule();
        }
    }

    // Entries

    /// Append `lines` after the session's last line.
    pub fn append<S: AsRef<str>>(&self, session_id: &str, lines: &[S]) -> Result<AppendOutcome> {
        self.append_with_source(session_id, lines, None)
    }

    /// Append, recording the log file and project the lines came from.
    pub fn append_with_source<S: AsRef<str>>(
        &self,
        session_id: &str,
        lines: &[S],
        source: Option<&SessionLogPath>,
    ) -> Result<AppendOutcome> {
        self.append_with_timeout(session_id, lines, source, self.inner.config.lock_timeout())
    }

    /// Append, giving up on the session lock after `lock_timeout`.
    pub fn append_with_timeout<S: AsRef<str>>(
        &self,
        session_id: &str,
        lines: &[S],
        source: Option<&SessionLogPath>,
        lock_timeout: Duration,
    ) -> Result<AppendOutcome> {
        self.ensure_open()?;
        validate_session_id(session_id)?;
        if lines.is_empty() {
            return Err(Error::InvalidInput("no lines to append".to_string()));
        }

        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            let line = line.as_ref();
            if line.trim().is_empty() {
                return Err(Error::InvalidInput("blank line in batch".to_string()));
            }
            if line.contains('\n') {
                return Err(Error::InvalidInput(
                    "line contains an embedded newline".to_string(),
                ));
            }
            records.push(parse_record(line));
        }

        let file_path = source.map(|s| s.path.to_string_lossy().into_owned());
        let project_name = source.and_then(|s| s.project_name.clone());
        let inner = &self.inner;

        let key = session_lock_key(session_id);
        let outcome = inner.with_lock(&key, lock_timeout, |db| {
            let now = now_ms();
            Ok(db.append_entries(&AppendBatch {
                session_id,
                records: &records,
                owning_pid: inner.pid,
                host: &inner.host,
                file_path: file_path.as_deref(),
                project_name: project_name.as_deref(),
                now_ms: now,
                stale_before_ms: inner.stale_before(now),
            })?)
        })?;

        {
            let mut owned = inner.owned();
            if outcome.claimed {
                owned.insert(session_id.to_string());
            } else {
                owned.remove(session_id);
            }
        }

        tracing::debug!(
            session_id,
            first_line = outcome.first_line,
            last_line = outcome.last_line,
            claimed = outcome.claimed,
            "appended"
        );

        self.schedule_flush();
        Ok(outcome)
    }

    /// All stored lines of a session, in line order.
    pub fn read(&self, session_id: &str) -> Result<Vec<Record>> {
        let entries = self.inner.db().read_entries(session_id)?;
        Ok(entries
            .iter()
            .map(|entry| parse_record(&entry.raw_line))
            .collect())
    }

    pub fn read_entries(&self, session_id: &str) -> Result<Vec<EntryRecord>> {
        Ok(self.inner.db().read_entries(session_id)?)
    }

    pub fn line_numbers(&self, session_id: &str) -> Result<Vec<i64>> {
        Ok(self.inner.db().line_numbers(session_id)?)
    }

    /// Re-insert a log file at its own line numbers (1-based, blank lines
    /// keep their number but are skipped). Safe to repeat.
    pub fn import_file(&self, session_id: &str, path: &Path) -> Result<usize> {
        self.import_file_with_timeout(session_id, path, None, self.inner.config.lock_timeout())
    }

    /// Import, recording `source` in the session metadata and giving up on
    /// the session lock after `lock_timeout`.
    pub fn import_file_with_timeout(
        &self,
        session_id: &str,
        path: &Path,
        source: Option<&SessionLogPath>,
        lock_timeout: Duration,
    ) -> Result<usize> {
        self.ensure_open()?;
        validate_session_id(session_id)?;

        let text = std::fs::read_to_string(path)?;
        let lines: Vec<(i64, Record)> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| (index as i64 + 1, parse_record(line)))
            .collect();
        if lines.is_empty() {
            return Ok(0);
        }

        let file_path = source.map(|s| s.path.to_string_lossy().into_owned());
        let project_name = source.and_then(|s| s.project_name.clone());
        let inner = &self.inner;
        let key = session_lock_key(session_id);
        let imported = inner.with_lock(&key, lock_timeout, |db| {
            Ok(db.import_entries(
                session_id,
                &lines,
                inner.pid,
                (file_path.as_deref(), project_name.as_deref()),
                now_ms(),
            )?)
        })?;

        tracing::info!(session_id, imported, path = %path.display(), "imported log file");
        self.schedule_flush();
        Ok(imported)
    }

    /// Remove a session's entries, summaries, metadata and registration.
    pub fn clear_session(&self, session_id: &str) -> Result<usize> {
        self.ensure_open()?;
        let key = session_lock_key(session_id);
        let removed = self
            .inner
            .with_lock(&key, self.inner.config.lock_timeout(), |db| {
                Ok(db.clear_session(session_id)?)
            })?;
        self.inner.owned().remove(session_id);
        self.schedule_flush();
        Ok(removed)
    }

    // Liveness

    /// Refresh this process's registration for `session_id`. Best-effort:
    /// returns false on failure or when another process owns the session.
    pub fn heartbeat(&self, session_id: &str) -> bool {
        self.inner.beat(session_id)
    }

    /// Deactivate registrations whose heartbeat is older than the stale
    /// timeout and delete expired locks.
    pub fn reap_stale(&self) -> Result<ReapOutcome> {
        self.inner.reap()
    }

    pub fn registration(&self, session_id: &str) -> Result<Option<RegistrationRecord>> {
        Ok(self.inner.db().registration(session_id)?)
    }

    pub fn list_active(&self) -> Result<Vec<RegistrationRecord>> {
        Ok(self.inner.db().list_active()?)
    }

    pub fn owns(&self, session_id: &str) -> bool {
        self.inner.owned().contains(session_id)
    }

    // Advisory locks

    /// Single attempt at `key`; false when another process holds it.
    pub fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.try_lock(key, ttl.as_millis() as i64)
    }

    /// Retry [`acquire_lock`](Self::acquire_lock) until the configured lock
    /// timeout, then fail with [`Error::LockTimeout`].
    pub fn acquire_lock_blocking(&self, key: &str) -> Result<()> {
        self.inner
            .acquire_with_retry(key, self.inner.config.lock_timeout())
    }

    pub fn release_lock(&self, key: &str) -> Result<bool> {
        Ok(self.inner.db().release_lock(key, self.inner.pid)?)
    }

    // Summaries and metadata

    pub fn store_summary(&self, session_id: &str, summary: &str, through_line: i64) -> Result<i64> {
        self.ensure_open()?;
        validate_session_id(session_id)?;
        let id = self
            .inner
            .db()
            .store_summary(session_id, summary, through_line, now_ms())?;
        self.schedule_flush();
        Ok(id)
    }

    pub fn latest_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.inner.db().latest_summary(session_id)?)
    }

    pub fn session_meta(&self, session_id: &str) -> Result<Option<SessionMeta>> {
        Ok(self.inner.db().session_meta(session_id)?)
    }

    pub fn stats(&self) -> Result<StoreReport> {
        let counts = self.inner.db().stats()?;
        Ok(StoreReport {
            counts,
            file_bytes: file_len(&self.inner.path),
            wal_bytes: file_len(&wal_path(&self.inner.path)),
            flush_pending: self.inner.pending.load(Ordering::SeqCst),
        })
    }

    // Durability

    /// Complete any pending flush now.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush_pending()
    }

    pub fn flush_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Write a self-contained copy of the store to `dest`: the copy is built
    /// beside `dest` and renamed over it.
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = dest.with_file_name(tmp_name);
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }

        if let Err(err) = self.inner.db().vacuum_into(&tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::Persistence(err.to_string()));
        }
        std::fs::rename(&tmp, dest)?;

        tracing::info!(dest = %dest.display(), "store snapshot written");
        Ok(())
    }

    /// Stop background threads, complete a pending flush and mark this
    /// process's registrations inactive. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(heartbeat) = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            heartbeat.stop();
        }
        if let Some(flusher) = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            flusher.stop();
        }

        if let Err(err) = self.inner.flush_pending() {
            tracing::warn!(error = %err, "final flush failed");
        }

        match self
            .inner
            .db()
            .deactivate_owned(self.inner.pid, &self.inner.host)
        {
            Ok(count) => tracing::debug!(pid = self.inner.pid, count, "registrations released"),
            Err(err) => tracing::warn!(error = %err, "failed to release registrations"),
        }
        self.inner.owned().clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(Error::InvalidInput("empty session id".to_string()));
    }
    Ok(())
}

fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet_config() -> StoreConfig {
        StoreConfig {
            heartbeat_interval_ms: 0,
            flush_debounce_ms: 50,
            lock_timeout_ms: 200,
            ..StoreConfig::default()
        }
    }

    fn user(text: &str) -> String {
        format!(r#"{{"type":"user","message":{{"content":"{}"}}}}"#, text)
    }

    #[test]
    fn test_append_assigns_consecutive_lines() -> Result<()> {
        let dir = TempDir::new()?;
        let store = SessionStore::open_with_identity(
            &dir.path().join("s.db"),
            &quiet_config(),
            100,
            "host",
        )?;

        let first = store.append("s1", &[user("a"), user("b")])?;
        let second = store.append("s1", &[user("c")])?;

        assert_eq!((first.first_line, first.last_line), (1, 2));
        assert_eq!((second.first_line, second.last_line), (3, 3));
        assert!(first.claimed);
        assert!(store.owns("s1"));

        let records = store.read("s1")?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].raw_line, user("c"));
        Ok(())
    }

    #[test]
    fn test_append_rejects_bad_input() -> Result<()> {
        let dir = TempDir::new()?;
        let store = SessionStore::open_with_identity(
            &dir.path().join("s.db"),
            &quiet_config(),
            100,
            "host",
        )?;

        let empty: [&str; 0] = [];
        assert!(matches!(
            store.append("s1", &empty),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.append("  ", &[user("a")]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.append("s1", &["{\"a\":1}\n{\"b\":2}"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(store.read("s1")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_lock_held_by_other_pid_times_out() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("s.db");
        let holder = SessionStore::open_with_identity(&path, &quiet_config(), 1, "host")?;
        let writer = SessionStore::open_with_identity(&path, &quiet_config(), 2, "host")?;

        assert!(holder.acquire_lock(&session_lock_key("s1"), Duration::from_secs(60))?);

        let err = writer.append("s1", &[user("blocked")]).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(err.is_transient());

        assert!(holder.release_lock(&session_lock_key("s1"))?);
        writer.append("s1", &[user("free")])?;
        assert_eq!(writer.line_numbers("s1")?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_expired_lock_is_taken_over() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("s.db");
        let holder = SessionStore::open_with_identity(&path, &quiet_config(), 1, "host")?;
        let other = SessionStore::open_with_identity(&path, &quiet_config(), 2, "host")?;

        assert!(holder.acquire_lock("job", Duration::ZERO)?);
        assert!(other.acquire_lock("job", Duration::from_secs(60))?);
        assert!(!holder.acquire_lock("job", Duration::from_secs(60))?);
        Ok(())
    }

    #[test]
    fn test_flush_clears_pending() -> Result<()> {
        let dir = TempDir::new()?;
        let config = StoreConfig {
            flush_debounce_ms: 60_000,
            ..quiet_config()
        };
        let store = SessionStore::open_with_identity(&dir.path().join("s.db"), &config, 1, "h")?;

        store.append("s1", &[user("a")])?;
        assert!(store.flush_pending());

        store.flush()?;
        assert!(!store.flush_pending());
        Ok(())
    }

    #[test]
    fn test_debounced_flush_runs_in_background() -> Result<()> {
        let dir = TempDir::new()?;
        let store =
            SessionStore::open_with_identity(&dir.path().join("s.db"), &quiet_config(), 1, "h")?;

        store.append("s1", &[user("a")])?;
        store.append("s1", &[user("b")])?;

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.flush_pending() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!store.flush_pending());
        Ok(())
    }

    #[test]
    fn test_shutdown_releases_registrations() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("s.db");
        let store = SessionStore::open_with_identity(&path, &quiet_config(), 7, "h")?;

        store.append("s1", &[user("a")])?;
        store.shutdown();
        store.shutdown();

        assert!(store.is_shut_down());
        assert!(!store.flush_pending());
        let reg = store.registration("s1")?.expect("registration row");
        assert!(!reg.is_active);
        assert!(matches!(
            store.append("s1", &[user("late")]),
            Err(Error::Shutdown)
        ));
        Ok(())
    }

    #[test]
    fn test_import_file_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let log = dir.path().join("log.jsonl");
        std::fs::write(&log, format!("{}\n\n{}\n", user("one"), user("three")))?;

        let store =
            SessionStore::open_with_identity(&dir.path().join("s.db"), &quiet_config(), 1, "h")?;
        assert_eq!(store.import_file("s1", &log)?, 2);
        assert_eq!(store.import_file("s1", &log)?, 2);

        assert_eq!(store.line_numbers("s1")?, vec![1, 3]);
        // New appends continue after the highest imported line.
        let out = store.append("s1", &[user("four")])?;
        assert_eq!(out.first_line, 4);
        Ok(())
    }

    #[test]
    fn test_summaries_meta_and_stats() -> Result<()> {
        let dir = TempDir::new()?;
        let store =
            SessionStore::open_with_identity(&dir.path().join("s.db"), &quiet_config(), 1, "h")?;

        store.append("s1", &[user("a"), user("b")])?;
        store.store_summary("s1", "first pass", 1)?;
        store.store_summary("s1", "second pass", 2)?;

        let latest = store.latest_summary("s1")?.expect("summary");
        assert_eq!(latest.summary, "second pass");
        assert_eq!(latest.through_line, 2);

        let meta = store.session_meta("s1")?.expect("meta");
        assert_eq!(meta.entry_count, 2);
        assert_eq!(meta.max_line_number, 2);

        let report = store.stats()?;
        assert_eq!(report.counts.sessions, 1);
        assert_eq!(report.counts.entries, 2);
        assert_eq!(report.counts.summaries, 2);
        assert_eq!(report.counts.active_sessions, 1);
        assert!(report.file_bytes > 0);

        assert_eq!(store.clear_session("s1")?, 2);
        assert!(store.read("s1")?.is_empty());
        assert!(store.latest_summary("s1")?.is_none());
        assert!(!store.owns("s1"));
        Ok(())
    }

    #[test]
    fn test_snapshot_replaces_destination() -> Result<()> {
        let dir = TempDir::new()?;
        let store =
            SessionStore::open_with_identity(&dir.path().join("s.db"), &quiet_config(), 1, "h")?;
        store.append("s1", &[user("a")])?;

        let dest = dir.path().join("backup").join("copy.db");
        store.snapshot_to(&dest)?;
        store.append("s1", &[user("b")])?;
        store.snapshot_to(&dest)?;

        assert!(!dest.with_file_name("copy.db.tmp").exists());
        let copy = Database::open(&dest)?;
        assert_eq!(copy.line_numbers("s1")?, vec![1, 2]);
        Ok(())
    }
}
