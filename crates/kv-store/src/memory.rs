//! In-memory `KvStore`, used by the façade's `init()` hard-reset path and
//! by every unit test in the workspace that does not need RocksDB.

use crate::{BackendError, Column, KvStore, WriteOp};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct InMemoryKvStore {
    // One ordered map per column; BTreeMap gives byte-lexicographic
    // iteration order for free, matching the backend's contract.
    columns: RwLock<Vec<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        InMemoryKvStore {
            columns: RwLock::new(vec![BTreeMap::new(); crate::NUM_COLUMNS as usize]),
        }
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.columns.read()[col.index() as usize].get(key).cloned())
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.columns.write()[col.index() as usize].insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, col: Column, key: &[u8]) -> Result<(), BackendError> {
        self.columns.write()[col.index() as usize].remove(key);
        Ok(())
    }

    fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), BackendError> {
        let mut columns = self.columns.write();
        for op in ops {
            match op {
                WriteOp::Put(col, k, v) => {
                    columns[col.index() as usize].insert(k, v);
                }
                WriteOp::Delete(col, k) => {
                    columns[col.index() as usize].remove(&k);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, col: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        Ok(self.columns.read()[col.index() as usize]
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn reset(&self) -> Result<(), BackendError> {
        let mut columns = self.columns.write();
        for c in columns.iter_mut() {
            c.clear();
        }
        Ok(())
    }
}
