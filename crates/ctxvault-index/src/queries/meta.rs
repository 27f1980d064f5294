use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::SessionMeta};

/// Create or refresh the metadata row. Path and project are only
/// overwritten with non-null values.
pub fn touch(
    conn: &Connection,
    session_id: &str,
    file_path: Option<&str>,
    project_name: Option<&str>,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_meta (session_id, file_path, project_name, first_seen, last_updated)
        VALUES (?1, ?2, ?3, ?4, ?4)
        ON CONFLICT(session_id) DO UPDATE SET
            file_path = COALESCE(?2, file_path),
            project_name = COALESCE(?3, project_name),
            last_updated = ?4
        "#,
        params![session_id, file_path, project_name, now_ms],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<SessionMeta>> {
    let meta = conn
        .query_row(
            r#"
            SELECT m.session_id, m.file_path, m.project_name, m.first_seen, m.last_updated,
                   COUNT(e.line_number), COALESCE(SUM(e.byte_len), 0),
                   COALESCE(MAX(e.line_number), 0)
            FROM session_meta m
            LEFT JOIN session_entries e ON e.session_id = m.session_id
            WHERE m.session_id = ?1
            GROUP BY m.session_id
            "#,
            [session_id],
            |row| {
                Ok(SessionMeta {
                    session_id: row.get(0)?,
                    file_path: row.get(1)?,
                    project_name: row.get(2)?,
                    first_seen: row.get(3)?,
                    last_updated: row.get(4)?,
                    entry_count: row.get(5)?,
                    total_bytes: row.get(6)?,
                    max_line_number: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(meta)
}

pub fn delete(conn: &Connection, session_id: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM session_meta WHERE session_id = ?1", [session_id])?;
    Ok(removed)
}
