use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// File name of the process-wide session store inside the data directory.
pub const STORE_FILE_NAME: &str = "sessions.db";

/// Resolve the data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. CTXVAULT_PATH environment variable (with tilde expansion)
/// 3. System data directory (recommended default)
/// 4. ~/.ctxvault (fallback for systems without standard data directory)
pub fn resolve_data_dir(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("CTXVAULT_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("ctxvault"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".ctxvault"));
    }

    Err(Error::Config(
        "Could not determine data path: no HOME directory or system data directory found"
            .to_string(),
    ))
}

/// Path of the store file inside a data directory.
pub fn store_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORE_FILE_NAME)
}

/// Expand tilde (~) in paths to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// Normalize a path for comparison (resolve to absolute, canonicalize if possible)
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Default roots under which session logs live (`~/.claude/projects`).
pub fn default_session_roots() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join(".claude").join("projects")])
        .unwrap_or_default()
}

/// A path recognized as a session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLogPath {
    pub path: PathBuf,
    /// File stem of the log, e.g. the session UUID.
    pub session_id: String,
    /// Name of the directory holding the log (the encoded project dir).
    pub project_name: Option<String>,
}

/// Recognize `path` as a session log: a `.jsonl` file under one of `roots`.
///
/// The file does not need to exist yet (appends create it).
pub fn recognize_session_log(path: &Path, roots: &[PathBuf]) -> Option<SessionLogPath> {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }

    let session_id = path.file_stem()?.to_str()?.to_string();
    if session_id.is_empty() {
        return None;
    }

    let normalized = normalize_parent(path);
    let under_root = roots.iter().any(|root| {
        let root = normalize_path(root);
        normalized.starts_with(&root) && normalized != root
    });
    if !under_root {
        return None;
    }

    let project_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string);

    Some(SessionLogPath {
        path: path.to_path_buf(),
        session_id,
        project_name,
    })
}

// Canonicalize the parent (which usually exists) and re-attach the file name,
// so a log that has not been created yet still resolves through symlinks.
fn normalize_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            normalize_path(parent).join(name)
        }
        _ => normalize_path(path),
    }
}
