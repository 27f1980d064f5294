//! TestWorld pattern for isolated store and interceptor tests.
//!
//! Lays out a temp dir as:
//! ```text
//! <tmp>/.ctxvault/            data dir (store file lives here)
//! <tmp>/.claude/projects/     session root
//! ```

use anyhow::Result;
use ctxvault_types::{Record, read_log_file};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::fixtures::LogBuilder;

/// Declarative test environment.
///
/// # Example
/// ```
/// use ctxvault_testing::{LogBuilder, TestWorld};
///
/// let world = TestWorld::new();
/// let path = world
///     .write_log("-home-me-app", "s-1", &LogBuilder::new("s-1").user("hi"))
///     .unwrap();
/// assert!(path.starts_with(world.session_root()));
/// ```
pub struct TestWorld {
    temp_dir: TempDir,
    data_dir: PathBuf,
    session_root: PathBuf,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_path = temp_dir.path().to_path_buf();
        let data_dir = base_path.join(".ctxvault");
        let session_root = base_path.join(".claude").join("projects");

        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");
        std::fs::create_dir_all(&session_root).expect("Failed to create session root");

        Self {
            temp_dir,
            data_dir,
            session_root,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn session_root(&self) -> &Path {
        &self.session_root
    }

    pub fn session_roots(&self) -> Vec<PathBuf> {
        vec![self.session_root.clone()]
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }

    /// Path of a session log; the project directory is created.
    pub fn session_log_path(&self, project: &str, session_id: &str) -> PathBuf {
        let dir = self.session_root.join(project);
        std::fs::create_dir_all(&dir).expect("Failed to create project dir");
        dir.join(format!("{}.jsonl", session_id))
    }

    /// A `.jsonl` path outside every session root.
    pub fn foreign_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn write_log(&self, project: &str, session_id: &str, log: &LogBuilder) -> Result<PathBuf> {
        let path = self.session_log_path(project, session_id);
        log.write_to(&path)?;
        Ok(path)
    }

    pub fn read_log(&self, path: &Path) -> Result<Vec<Record>> {
        Ok(read_log_file(path)?)
    }
}
