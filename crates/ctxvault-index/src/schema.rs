use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 3;

// Entries keep the raw line as the source of truth; kind/timestamp columns
// exist for inspection only and are recomputed by the parser on read.
//
// Timestamps used for liveness (last_heartbeat, expires_at, ...) are integer
// epoch milliseconds so staleness checks stay plain integer comparisons.

/// Bring the schema to `SCHEMA_VERSION`. Runs under a write lock so two
/// processes opening a fresh file cannot drop each other's tables.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    migrate(&tx)?;
    tx.commit()?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        if current_version != 0 {
            // Mirrored lines are lost here; the interceptor re-imports each
            // session from its log file the next time it is read or appended.
            let dropped_lines: i64 = conn
                .query_row("SELECT COUNT(*) FROM session_entries", [], |row| row.get(0))
                .unwrap_or(0);
            tracing::warn!(
                from = current_version,
                to = SCHEMA_VERSION,
                dropped_lines,
                "store schema changed, recreating tables"
            );
        }
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS session_entries (
            session_id TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            kind TEXT NOT NULL,
            raw_line TEXT NOT NULL,
            timestamp TEXT,
            owning_pid INTEGER NOT NULL,
            byte_len INTEGER NOT NULL,
            PRIMARY KEY (session_id, line_number)
        );

        CREATE TABLE IF NOT EXISTS session_meta (
            session_id TEXT PRIMARY KEY,
            file_path TEXT,
            project_name TEXT,
            first_seen INTEGER NOT NULL,
            last_updated INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            through_line INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS active_sessions (
            session_id TEXT PRIMARY KEY,
            owning_pid INTEGER NOT NULL,
            host TEXT NOT NULL,
            file_path TEXT,
            project_name TEXT,
            last_heartbeat INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS process_locks (
            lock_key TEXT PRIMARY KEY,
            owning_pid INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_session ON summaries(session_id, id DESC);
        CREATE INDEX IF NOT EXISTS idx_active_heartbeat ON active_sessions(is_active, last_heartbeat);
        CREATE INDEX IF NOT EXISTS idx_locks_expiry ON process_locks(expires_at);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS session_entries;
        DROP TABLE IF EXISTS session_meta;
        DROP TABLE IF EXISTS summaries;
        DROP TABLE IF EXISTS active_sessions;
        DROP TABLE IF EXISTS process_locks;
        "#,
    )?;
    Ok(())
}
