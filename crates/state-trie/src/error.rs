use std::fmt;

#[derive(Debug)]
pub enum TrieError {
    /// `set_root(h)` where `h` is neither the current root nor
    /// discoverable in the node store (spec §4.3).
    UnknownRoot,
    NodeStore(node_store::StoreError),
    /// A node failed to deserialize from its stored bytes.
    CorruptNode,
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::UnknownRoot => write!(f, "unknown trie root"),
            TrieError::NodeStore(e) => write!(f, "node store error: {}", e),
            TrieError::CorruptNode => write!(f, "corrupt trie node"),
        }
    }
}

impl std::error::Error for TrieError {}

impl From<node_store::StoreError> for TrieError {
    fn from(e: node_store::StoreError) -> Self {
        TrieError::NodeStore(e)
    }
}
