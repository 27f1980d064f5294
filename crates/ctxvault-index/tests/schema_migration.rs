//! Integration tests for schema migration and on-disk behavior
//!
//! `Database::open` drops and recreates tables when `user_version` does not
//! match, and two connections on one file see each other's commits.

use ctxvault_index::{AppendBatch, Database, SCHEMA_VERSION};
use ctxvault_types::parse_record;
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

/// A store written by an older build: different column layout, version 1.
fn create_old_schema_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE session_entries (
            session_id TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            raw_line TEXT NOT NULL,
            PRIMARY KEY (session_id, line_number)
        );
        INSERT INTO session_entries VALUES ('old', 1, '{"type":"user"}');
        PRAGMA user_version = 1;
        "#,
    )
    .unwrap();
}

fn user_line(text: &str) -> ctxvault_types::Record {
    parse_record(&format!(
        r#"{{"type":"user","message":{{"content":"{}"}}}}"#,
        text
    ))
}

#[test]
fn test_auto_migration_from_old_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sessions.db");
    create_old_schema_db(&db_path);

    let mut db = Database::open(&db_path).unwrap();

    let version: i32 = db
        .conn()
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
    // Old rows are gone; the new layout accepts appends.
    assert!(db.read_entries("old").unwrap().is_empty());

    let records = vec![user_line("hello")];
    let out = db
        .append_entries(&AppendBatch {
            session_id: "new",
            records: &records,
            owning_pid: 1,
            host: "h",
            file_path: None,
            project_name: None,
            now_ms: 1_000,
            stale_before_ms: 0,
        })
        .unwrap();
    assert_eq!(out.first_line, 1);
}

#[test]
fn test_reopen_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sessions.db");

    {
        let mut db = Database::open(&db_path).unwrap();
        let records = vec![user_line("a"), user_line("b")];
        db.append_entries(&AppendBatch {
            session_id: "s",
            records: &records,
            owning_pid: 1,
            host: "h",
            file_path: None,
            project_name: None,
            now_ms: 1_000,
            stale_before_ms: 0,
        })
        .unwrap();
    }

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.line_numbers("s").unwrap(), vec![1, 2]);
}

#[test]
fn test_wal_mode_and_shared_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sessions.db");

    let mut writer = Database::open(&db_path).unwrap();
    let reader = Database::open(&db_path).unwrap();

    let mode: String = reader
        .conn()
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let records = vec![user_line("x")];
    for pid in [10, 20] {
        writer
            .append_entries(&AppendBatch {
                session_id: "s",
                records: &records,
                owning_pid: pid,
                host: "h",
                file_path: None,
                project_name: None,
                now_ms: 1_000,
                stale_before_ms: 0,
            })
            .unwrap();
    }

    let entries = reader.read_entries("s").unwrap();
    let pids: Vec<i64> = entries.iter().map(|e| e.owning_pid).collect();
    assert_eq!(pids, vec![10, 20]);

    writer.checkpoint().unwrap();
}

#[test]
fn test_vacuum_into_copy() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sessions.db");
    let copy_path = temp_dir.path().join("copy.db");

    let mut db = Database::open(&db_path).unwrap();
    let records = vec![user_line("keep me")];
    db.append_entries(&AppendBatch {
        session_id: "s",
        records: &records,
        owning_pid: 1,
        host: "h",
        file_path: None,
        project_name: None,
        now_ms: 1_000,
        stale_before_ms: 0,
    })
    .unwrap();

    db.vacuum_into(&copy_path).unwrap();

    let copy = Database::open(&copy_path).unwrap();
    assert_eq!(copy.read_entries("s").unwrap()[0].raw_line, records[0].raw_line);
}
