//! RocksDB-backed `KvStore`, grounded directly in `kvdb-rocksdb`'s
//! `Database`/`DatabaseConfig` (kept path-dependency from the teacher).

use crate::{BackendError, Column, KvStore, WriteOp, NUM_COLUMNS};
use kvdb_rocksdb::{Database, DatabaseConfig};
use log::error;

pub struct RocksKvStore {
    db: Database,
}

impl RocksKvStore {
    pub fn open(path: &str) -> Result<Self, BackendError> {
        let config = DatabaseConfig::with_columns(NUM_COLUMNS);
        let db = Database::open(&config, path).map_err(|e| {
            error!("failed to open rocksdb at {}: {}", path, e);
            BackendError::BackendUnavailable(e.to_string())
        })?;
        Ok(RocksKvStore { db })
    }
}

impl KvStore for RocksKvStore {
    fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.db
            .get(col.index(), key)
            .map(|opt| opt.map(|v| v.into_vec()))
            .map_err(|e| BackendError::BackendUnavailable(e.to_string()))
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        let mut tr = self.db.transaction();
        tr.put(col.index(), key, value);
        self.db
            .write(tr)
            .map_err(|e| BackendError::BackendUnavailable(e.to_string()))
    }

    fn delete(&self, col: Column, key: &[u8]) -> Result<(), BackendError> {
        let mut tr = self.db.transaction();
        tr.delete(col.index(), key);
        self.db
            .write(tr)
            .map_err(|e| BackendError::BackendUnavailable(e.to_string()))
    }

    fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), BackendError> {
        let mut tr = self.db.transaction();
        for op in ops {
            match op {
                WriteOp::Put(col, k, v) => tr.put(col.index(), &k, &v),
                WriteOp::Delete(col, k) => tr.delete(col.index(), &k),
            }
        }
        self.db
            .write(tr)
            .map_err(|e| BackendError::BackendUnavailable(e.to_string()))
    }

    fn iter_prefix(&self, col: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        Ok(self
            .db
            .iter(col.index())
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.into_vec(), v.into_vec()))
            .collect())
    }

    fn reset(&self) -> Result<(), BackendError> {
        let mut tr = self.db.transaction();
        for col in Column::all().iter() {
            for (k, _) in self.db.iter(col.index()) {
                tr.delete(col.index(), &k);
            }
        }
        self.db
            .write(tr)
            .map_err(|e| BackendError::Corrupt(e.to_string()))
    }
}
