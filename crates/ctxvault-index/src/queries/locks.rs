use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::LockRecord};

/// Take `lock_key` for `owning_pid` until `now_ms + ttl_ms`.
///
/// Succeeds when the key is free, expired, or already held by the same pid
/// (which extends it). Returns false when a live lock belongs to another pid.
pub fn try_acquire(
    conn: &Connection,
    lock_key: &str,
    owning_pid: i64,
    now_ms: i64,
    ttl_ms: i64,
) -> Result<bool> {
    let changed = conn.execute(
        r#"
        INSERT INTO process_locks (lock_key, owning_pid, expires_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(lock_key) DO UPDATE SET
            owning_pid = excluded.owning_pid,
            expires_at = excluded.expires_at
        WHERE process_locks.expires_at <= ?4
           OR process_locks.owning_pid = excluded.owning_pid
        "#,
        params![lock_key, owning_pid, now_ms + ttl_ms, now_ms],
    )?;
    Ok(changed > 0)
}

/// Release only if held by `owning_pid`.
pub fn release(conn: &Connection, lock_key: &str, owning_pid: i64) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM process_locks WHERE lock_key = ?1 AND owning_pid = ?2",
        params![lock_key, owning_pid],
    )?;
    Ok(changed > 0)
}

pub fn delete_expired(conn: &Connection, now_ms: i64) -> Result<usize> {
    let removed = conn.execute("DELETE FROM process_locks WHERE expires_at <= ?1", [now_ms])?;
    Ok(removed)
}

pub fn get(conn: &Connection, lock_key: &str) -> Result<Option<LockRecord>> {
    let lock = conn
        .query_row(
            "SELECT lock_key, owning_pid, expires_at FROM process_locks WHERE lock_key = ?1",
            [lock_key],
            |row| {
                Ok(LockRecord {
                    lock_key: row.get(0)?,
                    owning_pid: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(lock)
}
