use ctxvault_types::Record;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::queries::{entries, locks, meta, registry, stats, summaries};
use crate::records::{
    AppendBatch, AppendOutcome, CheckpointOutcome, EntryRecord, LockRecord, ReapOutcome,
    RegistrationRecord, SessionMeta, StoreStats, SummaryRecord,
};
use crate::schema;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to the shared store file.
///
/// Every process opens its own `Database`; SQLite's WAL journal lets readers
/// proceed while another process holds the write lock, and `busy_timeout`
/// bounds how long a writer waits for it.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        tracing::debug!(path = %db_path.display(), journal_mode = %mode, "opened store");

        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // Entries

    /// Append a batch after the session's current last line, refresh its
    /// metadata and claim its registration, all in one write transaction.
    pub fn append_entries(&mut self, batch: &AppendBatch<'_>) -> Result<AppendOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let first_line = entries::max_line_number(&tx, batch.session_id)? + 1;
        for (offset, record) in batch.records.iter().enumerate() {
            entries::upsert(
                &tx,
                batch.session_id,
                first_line + offset as i64,
                record,
                batch.owning_pid,
            )?;
        }

        meta::touch(
            &tx,
            batch.session_id,
            batch.file_path,
            batch.project_name,
            batch.now_ms,
        )?;

        let registration = RegistrationRecord {
            session_id: batch.session_id.to_string(),
            owning_pid: batch.owning_pid,
            host: batch.host.to_string(),
            file_path: batch.file_path.map(str::to_string),
            project_name: batch.project_name.map(str::to_string),
            last_heartbeat: batch.now_ms,
            is_active: true,
        };
        let claimed = registry::claim(&tx, &registration, batch.stale_before_ms)?;

        tx.commit()?;

        Ok(AppendOutcome {
            first_line,
            last_line: first_line + batch.records.len() as i64 - 1,
            inserted: batch.records.len(),
            claimed,
        })
    }

    /// Re-insert lines at fixed line numbers. Idempotent: existing rows with
    /// the same `(session_id, line_number)` are replaced.
    pub fn import_entries(
        &mut self,
        session_id: &str,
        lines: &[(i64, Record)],
        owning_pid: i64,
        source: (Option<&str>, Option<&str>),
        now_ms: i64,
    ) -> Result<usize> {
        let (file_path, project_name) = source;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (line_number, record) in lines {
            entries::upsert(&tx, session_id, *line_number, record, owning_pid)?;
        }
        meta::touch(&tx, session_id, file_path, project_name, now_ms)?;
        tx.commit()?;
        Ok(lines.len())
    }

    pub fn read_entries(&self, session_id: &str) -> Result<Vec<EntryRecord>> {
        entries::list(&self.conn, session_id)
    }

    pub fn line_numbers(&self, session_id: &str) -> Result<Vec<i64>> {
        entries::line_numbers(&self.conn, session_id)
    }

    pub fn max_line_number(&self, session_id: &str) -> Result<i64> {
        entries::max_line_number(&self.conn, session_id)
    }

    /// Remove every row belonging to a session. Returns removed entry count.
    pub fn clear_session(&mut self, session_id: &str) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = entries::delete_session(&tx, session_id)?;
        summaries::delete_session(&tx, session_id)?;
        meta::delete(&tx, session_id)?;
        registry::delete(&tx, session_id)?;
        tx.commit()?;
        Ok(removed)
    }

    // Registry

    pub fn claim_registration(
        &self,
        registration: &RegistrationRecord,
        stale_before_ms: i64,
    ) -> Result<bool> {
        registry::claim(&self.conn, registration, stale_before_ms)
    }

    pub fn heartbeat(
        &self,
        session_id: &str,
        owning_pid: i64,
        host: &str,
        now_ms: i64,
    ) -> Result<bool> {
        registry::heartbeat(&self.conn, session_id, owning_pid, host, now_ms)
    }

    /// Deactivate stale registrations and delete expired locks.
    pub fn reap_stale(&mut self, stale_before_ms: i64, now_ms: i64) -> Result<ReapOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deactivated = registry::deactivate_stale(&tx, stale_before_ms)?;
        let locks_removed = locks::delete_expired(&tx, now_ms)?;
        tx.commit()?;
        Ok(ReapOutcome {
            deactivated,
            locks_removed,
        })
    }

    pub fn deactivate_owned(&self, owning_pid: i64, host: &str) -> Result<usize> {
        registry::deactivate_owned(&self.conn, owning_pid, host)
    }

    pub fn registration(&self, session_id: &str) -> Result<Option<RegistrationRecord>> {
        registry::get(&self.conn, session_id)
    }

    pub fn list_active(&self) -> Result<Vec<RegistrationRecord>> {
        registry::list_active(&self.conn)
    }

    // Advisory locks

    pub fn try_acquire_lock(
        &self,
        lock_key: &str,
        owning_pid: i64,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool> {
        locks::try_acquire(&self.conn, lock_key, owning_pid, now_ms, ttl_ms)
    }

    pub fn release_lock(&self, lock_key: &str, owning_pid: i64) -> Result<bool> {
        locks::release(&self.conn, lock_key, owning_pid)
    }

    pub fn lock(&self, lock_key: &str) -> Result<Option<LockRecord>> {
        locks::get(&self.conn, lock_key)
    }

    // Summaries and metadata

    pub fn store_summary(
        &self,
        session_id: &str,
        summary: &str,
        through_line: i64,
        now_ms: i64,
    ) -> Result<i64> {
        summaries::insert(&self.conn, session_id, summary, through_line, now_ms)
    }

    pub fn latest_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        summaries::latest(&self.conn, session_id)
    }

    pub fn session_meta(&self, session_id: &str) -> Result<Option<SessionMeta>> {
        meta::get(&self.conn, session_id)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        stats::collect(&self.conn)
    }

    // Durability

    /// Copy WAL frames into the main file without waiting on readers.
    pub fn checkpoint(&self) -> Result<CheckpointOutcome> {
        let outcome = self
            .conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |row| {
                Ok(CheckpointOutcome {
                    busy: row.get::<_, i64>(0)? != 0,
                    log_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            })?;
        Ok(outcome)
    }

    /// Write a compacted, self-contained copy of the store to `dest`.
    /// `dest` must not exist.
    pub fn vacuum_into(&self, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy().into_owned();
        self.conn.execute("VACUUM INTO ?1", [&dest])?;
        Ok(())
    }
}
