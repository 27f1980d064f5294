use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::SummaryRecord};

pub fn insert(
    conn: &Connection,
    session_id: &str,
    summary: &str,
    through_line: i64,
    now_ms: i64,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO summaries (session_id, summary, through_line, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![session_id, summary, through_line, now_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest(conn: &Connection, session_id: &str) -> Result<Option<SummaryRecord>> {
    let summary = conn
        .query_row(
            r#"
            SELECT id, session_id, summary, through_line, created_at
            FROM summaries
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT 1
            "#,
            [session_id],
            |row| {
                Ok(SummaryRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    summary: row.get(2)?,
                    through_line: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(summary)
}

pub fn delete_session(conn: &Connection, session_id: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM summaries WHERE session_id = ?1", [session_id])?;
    Ok(removed)
}
