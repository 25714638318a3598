use std::fmt;

/// §7: `BackendUnavailable` is transient (façade may retry), `Corrupt` is
/// fatal and must propagate all the way to a shutdown signal.
#[derive(Debug)]
pub enum BackendError {
    BackendUnavailable(String),
    Corrupt(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::BackendUnavailable(msg) => write!(f, "backend unavailable: {}", msg),
            BackendError::Corrupt(msg) => write!(f, "corrupt store: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        // RocksDB surfaces most transient conditions (lock contention,
        // disk pressure) as io::Error; treat anything not explicitly
        // flagged corrupt as a transient backend failure.
        BackendError::BackendUnavailable(e.to_string())
    }
}
