use std::fmt;

#[derive(Debug)]
pub enum StorageError {
    Trie(state_trie::TrieError),
    Backend(kv_store::BackendError),
    /// A query's indices descended past a field that was previously
    /// written as a scalar (spec §4.4 depth metadata mismatch).
    DepthMismatch,
    /// A splatted value's wire encoding didn't parse as a `StateValue`.
    MalformedValue,
    /// `Account::set_code` when code is already set (spec §4.5).
    CodeAlreadySet,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Trie(e) => write!(f, "trie error: {}", e),
            StorageError::Backend(e) => write!(f, "backend error: {}", e),
            StorageError::DepthMismatch => write!(f, "query depth does not match stored field shape"),
            StorageError::MalformedValue => write!(f, "malformed state value"),
            StorageError::CodeAlreadySet => write!(f, "contract code already set"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<state_trie::TrieError> for StorageError {
    fn from(e: state_trie::TrieError) -> Self {
        StorageError::Trie(e)
    }
}

impl From<kv_store::BackendError> for StorageError {
    fn from(e: kv_store::BackendError) -> Self {
        StorageError::Backend(e)
    }
}
