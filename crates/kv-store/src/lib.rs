//! C1: the durable ordered key-value store. No user-visible ordering
//! beyond byte-lexicographic; callers impose logical order via key
//! construction (spec §4.1). Writes are atomic at batch granularity.

pub mod error;
pub mod memory;
pub mod rocks;

pub use error::BackendError;
pub use memory::InMemoryKvStore;
pub use rocks::RocksKvStore;

/// The five column families of spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    State,
    ContractCode,
    ContractInitData,
    ContractStateDb,
    Metadata,
}

pub const NUM_COLUMNS: u32 = 5;

impl Column {
    pub fn index(self) -> u32 {
        match self {
            Column::State => 0,
            Column::ContractCode => 1,
            Column::ContractInitData => 2,
            Column::ContractStateDb => 3,
            Column::Metadata => 4,
        }
    }

    pub fn all() -> [Column; 5] {
        [
            Column::State,
            Column::ContractCode,
            Column::ContractInitData,
            Column::ContractStateDb,
            Column::Metadata,
        ]
    }
}

/// Reserved metadata key holding the 32-byte current committed state root.
pub const STATEROOT_KEY: &[u8] = b"STATEROOT";

#[derive(Debug, Clone)]
pub enum WriteOp {
    Put(Column, Vec<u8>, Vec<u8>),
    Delete(Column, Vec<u8>),
}

/// Durable ordered byte-key -> byte-value map (spec §4.1).
pub trait KvStore: Send + Sync {
    fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), BackendError>;
    fn delete(&self, col: Column, key: &[u8]) -> Result<(), BackendError>;
    /// Either every op in `ops` becomes visible, or none do.
    fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), BackendError>;
    /// Eagerly collected so the result is a consistent point-in-time
    /// snapshot regardless of concurrent writers.
    fn iter_prefix(&self, col: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError>;
    /// Hard reset: drops every key in every column. Used by
    /// `AccountEngine::init()`.
    fn reset(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get(Column::State, b"k").unwrap(), None);
        store.put(Column::State, b"k", b"v").unwrap();
        assert_eq!(store.get(Column::State, b"k").unwrap(), Some(b"v".to_vec()));

        store
            .batch_write(vec![
                WriteOp::Put(Column::State, b"a".to_vec(), b"1".to_vec()),
                WriteOp::Put(Column::State, b"b".to_vec(), b"2".to_vec()),
                WriteOp::Delete(Column::State, b"k".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.get(Column::State, b"k").unwrap(), None);
        assert_eq!(store.get(Column::State, b"a").unwrap(), Some(b"1".to_vec()));

        let mut prefixed = store.iter_prefix(Column::State, b"").unwrap();
        prefixed.sort();
        assert_eq!(
            prefixed,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );

        store.reset().unwrap();
        assert_eq!(store.get(Column::State, b"a").unwrap(), None);
    }

    #[test]
    fn memory_store_behaves() {
        exercise(&InMemoryKvStore::new());
    }
}
