//! Crate-boundary error enum for the façade, following the same
//! tagged-value, no-exceptions-across-boundaries convention as every
//! lower layer (spec §7, DESIGN NOTES §9 "exceptions for control flow").

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    Trie(state_trie::TrieError),
    Store(node_store::StoreError),
    Storage(contract_storage::StorageError),
    Backend(kv_store::BackendError),
    Ipc(interpreter_ipc::IpcError),
    Config(String),
    /// `BackendUnavailable` (spec §7): a transient KV-store failure the
    /// façade should retry rather than treat as fatal corruption.
    BackendUnavailable,
    /// `Corrupt` (spec §7): a structural failure that must not be
    /// swallowed; the façade signals shutdown rather than continuing.
    Corrupt(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Trie(e) => write!(f, "trie error: {}", e),
            EngineError::Store(e) => write!(f, "node store error: {}", e),
            EngineError::Storage(e) => write!(f, "contract storage error: {}", e),
            EngineError::Backend(e) => write!(f, "kv backend error: {}", e),
            EngineError::Ipc(e) => write!(f, "interpreter ipc error: {}", e),
            EngineError::Config(s) => write!(f, "config error: {}", s),
            EngineError::BackendUnavailable => write!(f, "kv backend transiently unavailable"),
            EngineError::Corrupt(s) => write!(f, "fatal corruption: {}", s),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<state_trie::TrieError> for EngineError {
    fn from(e: state_trie::TrieError) -> Self {
        EngineError::Trie(e)
    }
}
impl From<node_store::StoreError> for EngineError {
    fn from(e: node_store::StoreError) -> Self {
        EngineError::Store(e)
    }
}
impl From<contract_storage::StorageError> for EngineError {
    fn from(e: contract_storage::StorageError) -> Self {
        EngineError::Storage(e)
    }
}
impl From<kv_store::BackendError> for EngineError {
    fn from(e: kv_store::BackendError) -> Self {
        EngineError::Backend(e)
    }
}
impl From<interpreter_ipc::IpcError> for EngineError {
    fn from(e: interpreter_ipc::IpcError) -> Self {
        EngineError::Ipc(e)
    }
}
