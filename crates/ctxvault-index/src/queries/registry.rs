use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Result, records::RegistrationRecord};

const COLUMNS: &str =
    "session_id, owning_pid, host, file_path, project_name, last_heartbeat, is_active";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RegistrationRecord> {
    Ok(RegistrationRecord {
        session_id: row.get(0)?,
        owning_pid: row.get(1)?,
        host: row.get(2)?,
        file_path: row.get(3)?,
        project_name: row.get(4)?,
        last_heartbeat: row.get(5)?,
        is_active: row.get(6)?,
    })
}

/// Claim the registration for `reg.owning_pid`.
///
/// Takes over when there is no row, the row is inactive, its heartbeat is
/// older than `stale_before_ms`, or the same process already owns it.
/// Returns false when a live registration belongs to another process.
pub fn claim(conn: &Connection, reg: &RegistrationRecord, stale_before_ms: i64) -> Result<bool> {
    let changed = conn.execute(
        r#"
        INSERT INTO active_sessions
            (session_id, owning_pid, host, file_path, project_name, last_heartbeat, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
        ON CONFLICT(session_id) DO UPDATE SET
            owning_pid = excluded.owning_pid,
            host = excluded.host,
            file_path = COALESCE(excluded.file_path, active_sessions.file_path),
            project_name = COALESCE(excluded.project_name, active_sessions.project_name),
            last_heartbeat = excluded.last_heartbeat,
            is_active = 1
        WHERE active_sessions.is_active = 0
           OR active_sessions.last_heartbeat < ?7
           OR (active_sessions.owning_pid = excluded.owning_pid
               AND active_sessions.host = excluded.host)
        "#,
        params![
            &reg.session_id,
            reg.owning_pid,
            &reg.host,
            &reg.file_path,
            &reg.project_name,
            reg.last_heartbeat,
            stale_before_ms,
        ],
    )?;
    Ok(changed > 0)
}

/// Refresh the heartbeat of a registration owned by `owning_pid`.
pub fn heartbeat(
    conn: &Connection,
    session_id: &str,
    owning_pid: i64,
    host: &str,
    now_ms: i64,
) -> Result<bool> {
    let changed = conn.execute(
        r#"
        UPDATE active_sessions
        SET last_heartbeat = ?4, is_active = 1
        WHERE session_id = ?1 AND owning_pid = ?2 AND host = ?3
        "#,
        params![session_id, owning_pid, host, now_ms],
    )?;
    Ok(changed > 0)
}

pub fn deactivate_stale(conn: &Connection, stale_before_ms: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE active_sessions SET is_active = 0 WHERE is_active = 1 AND last_heartbeat < ?1",
        [stale_before_ms],
    )?;
    Ok(changed)
}

/// Mark every registration held by this process inactive.
pub fn deactivate_owned(conn: &Connection, owning_pid: i64, host: &str) -> Result<usize> {
    let changed = conn.execute(
        r#"
        UPDATE active_sessions SET is_active = 0
        WHERE owning_pid = ?1 AND host = ?2 AND is_active = 1
        "#,
        params![owning_pid, host],
    )?;
    Ok(changed)
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<RegistrationRecord>> {
    let reg = conn
        .query_row(
            &format!("SELECT {} FROM active_sessions WHERE session_id = ?1", COLUMNS),
            [session_id],
            from_row,
        )
        .optional()?;
    Ok(reg)
}

pub fn list_active(conn: &Connection) -> Result<Vec<RegistrationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM active_sessions WHERE is_active = 1 ORDER BY last_heartbeat DESC",
        COLUMNS
    ))?;
    let regs = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(regs)
}

pub fn delete(conn: &Connection, session_id: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM active_sessions WHERE session_id = ?1", [session_id])?;
    Ok(removed)
}
