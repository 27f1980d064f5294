// Runtime layer - owns the process-side lifecycle of the shared store
// (heartbeats, debounced flush, reaping, exit hook) and the read/append
// interceptor that sits in front of session log files.

pub mod config;
pub mod error;
pub mod exit;
pub mod interceptor;
pub mod store;

pub use config::{Config, InterceptorConfig, StoreConfig};
pub use error::{Error, Result};
pub use exit::{SIGNAL_EXIT_CODE, install_exit_handler};
pub use interceptor::{AppendDisposition, InterceptorStats, LogInterceptor};
pub use store::{SessionStore, StoreReport, session_lock_key};
