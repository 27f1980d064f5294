use std::fmt;
use std::time::Duration;

/// Result type for ctxvault-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Store/index layer error
    Index(ctxvault_index::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Rejected input (empty batch, empty session id, ...)
    InvalidInput(String),

    /// Advisory lock still held by another process after retrying
    LockTimeout { key: String, waited: Duration },

    /// The store file could not be written (held by another writer past
    /// its busy timeout, or unreadable)
    StoreUnavailable(String),

    /// Durable flush failed; the flush stays pending
    Persistence(String),

    /// The store was shut down
    Shutdown,
}

impl Error {
    /// Errors worth retrying later rather than reporting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout { .. } | Error::StoreUnavailable(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Index(err) => write!(f, "Store error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::LockTimeout { key, waited } => {
                write!(f, "Timed out after {:?} waiting for lock '{}'", waited, key)
            }
            Error::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Error::Persistence(msg) => write!(f, "Persistence failure: {}", msg),
            Error::Shutdown => write!(f, "Store has been shut down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Index(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_)
            | Error::InvalidInput(_)
            | Error::LockTimeout { .. }
            | Error::StoreUnavailable(_)
            | Error::Persistence(_)
            | Error::Shutdown => None,
        }
    }
}

impl From<ctxvault_index::Error> for Error {
    fn from(err: ctxvault_index::Error) -> Self {
        if err.is_busy() {
            Error::StoreUnavailable(err.to_string())
        } else {
            Error::Index(err)
        }
    }
}

impl From<ctxvault_core::Error> for Error {
    fn from(err: ctxvault_core::Error) -> Self {
        match err {
            ctxvault_core::Error::Io(err) => Error::Io(err),
            ctxvault_core::Error::Config(msg) => Error::Config(msg),
        }
    }
}

impl From<ctxvault_types::Error> for Error {
    fn from(err: ctxvault_types::Error) -> Self {
        match err {
            ctxvault_types::Error::Io(err) => Error::Io(err),
            other => Error::InvalidInput(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
