use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Killing an absent key outside archival mode (spec §3 "Refcounted
    /// node" invariants; see also DESIGN NOTES §9 on `MemoryDB::kill`).
    KillMissing,
    Backend(kv_store::BackendError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::KillMissing => write!(f, "kill of a node absent from the overlay"),
            StoreError::Backend(e) => write!(f, "backend error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<kv_store::BackendError> for StoreError {
    fn from(e: kv_store::BackendError) -> Self {
        StoreError::Backend(e)
    }
}
