use rusqlite::Connection;

use crate::{Result, records::StoreStats};

pub fn collect(conn: &Connection) -> Result<StoreStats> {
    let stats = conn.query_row(
        r#"
        SELECT
            (SELECT COUNT(DISTINCT session_id) FROM session_entries),
            (SELECT COUNT(*) FROM session_entries),
            (SELECT COALESCE(SUM(byte_len), 0) FROM session_entries),
            (SELECT COUNT(*) FROM active_sessions WHERE is_active = 1),
            (SELECT COUNT(*) FROM process_locks),
            (SELECT COUNT(*) FROM summaries)
        "#,
        [],
        |row| {
            Ok(StoreStats {
                sessions: row.get(0)?,
                entries: row.get(1)?,
                total_bytes: row.get(2)?,
                active_sessions: row.get(3)?,
                locks: row.get(4)?,
                summaries: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}
