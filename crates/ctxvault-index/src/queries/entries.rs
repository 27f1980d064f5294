use ctxvault_types::Record;
use rusqlite::{Connection, params};

use crate::{Result, records::EntryRecord};

pub fn max_line_number(conn: &Connection, session_id: &str) -> Result<i64> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(line_number), 0) FROM session_entries WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

/// Insert or replace one line at an explicit line number.
pub fn upsert(
    conn: &Connection,
    session_id: &str,
    line_number: i64,
    record: &Record,
    owning_pid: i64,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT OR REPLACE INTO session_entries
            (session_id, line_number, kind, raw_line, timestamp, owning_pid, byte_len)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )?;
    stmt.execute(params![
        session_id,
        line_number,
        record.kind.as_str(),
        &record.raw_line,
        record.timestamp.map(|ts| ts.to_rfc3339()),
        owning_pid,
        record.estimated_size_bytes as i64,
    ])?;
    Ok(())
}

pub fn list(conn: &Connection, session_id: &str) -> Result<Vec<EntryRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, line_number, kind, raw_line, timestamp, owning_pid
        FROM session_entries
        WHERE session_id = ?1
        ORDER BY line_number ASC
        "#,
    )?;

    let entries = stmt
        .query_map([session_id], |row| {
            Ok(EntryRecord {
                session_id: row.get(0)?,
                line_number: row.get(1)?,
                kind: row.get(2)?,
                raw_line: row.get(3)?,
                timestamp: row.get(4)?,
                owning_pid: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn line_numbers(conn: &Connection, session_id: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT line_number FROM session_entries WHERE session_id = ?1 ORDER BY line_number ASC",
    )?;
    let numbers = stmt
        .query_map([session_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(numbers)
}

pub fn delete_session(conn: &Connection, session_id: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM session_entries WHERE session_id = ?1",
        [session_id],
    )?;
    Ok(removed)
}
