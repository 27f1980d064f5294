use crate::Result;
use ctxvault_core::{default_session_roots, resolve_data_dir, store_file_path};
use ctxvault_engine::CompactionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file override; defaults to `<data_dir>/sessions.db`.
    pub path: Option<PathBuf>,
    pub heartbeat_interval_ms: u64,
    pub stale_timeout_ms: u64,
    pub flush_debounce_ms: u64,
    pub lock_ttl_ms: u64,
    pub lock_timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            heartbeat_interval_ms: 5_000,
            stale_timeout_ms: 30_000,
            flush_debounce_ms: 2_000,
            lock_ttl_ms: 10_000,
            lock_timeout_ms: 2_000,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Configured path, or the default store file in the data directory.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(store_file_path(&resolve_data_dir(None)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub session_roots: Vec<PathBuf>,
    pub retry_window_ms: u64,
    pub deferred_retry_max_backoff_ms: u64,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            session_roots: default_session_roots(),
            retry_window_ms: 250,
            deferred_retry_max_backoff_ms: 5_000,
        }
    }
}

impl InterceptorConfig {
    pub fn retry_window(&self) -> Duration {
        Duration::from_millis(self.retry_window_ms)
    }

    pub fn deferred_retry_max_backoff(&self) -> Duration {
        Duration::from_millis(self.deferred_retry_max_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compaction: CompactionOptions,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_data_dir(None)?.join("config.toml"))
    }
}
