//! C2: reference-counted cache of trie nodes atop the KV store. Implements
//! spec §4.2 exactly: a `main` buffer that mutations land in and that
//! `commit`/`rollback` act on, a `pending_disk` buffer that exists purely
//! to back the one-deep `buffer_state`/`revert_state` snapshot, and an
//! auxiliary side channel keyed independently of the Merkle tree.
//!
//! On-disk encoding of a node row in the `State` column: `refcount(i32 BE)
//! || payload`. Refcounts therefore survive across commits, which is what
//! lets `purge` find zero-refcount nodes placed there by an earlier block.

pub mod error;

pub use error::StoreError;

use account_types::Hash;
use kv_store::{Column, KvStore, WriteOp};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeEntry {
    payload: Vec<u8>,
    refcount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AuxEntry {
    payload: Vec<u8>,
    live: bool,
}

pub struct OverlayNodeStore<S: KvStore> {
    backing: Arc<S>,
    archival: bool,
    main: RwLock<HashMap<Hash, NodeEntry>>,
    pending_disk: RwLock<Option<HashMap<Hash, NodeEntry>>>,
    aux: RwLock<HashMap<Vec<u8>, AuxEntry>>,
    /// Hashes whose on-disk refcount reached <= 0 at some past commit and
    /// have not yet been physically purged. Populated by `commit`,
    /// drained by `purge`. An in-process index, not itself durable —
    /// surviving a restart with unpurged dead nodes simply delays their
    /// collection to the next full scan (see DESIGN.md).
    dead_candidates: RwLock<HashSet<Hash>>,
    stop_signal: std::sync::atomic::AtomicBool,
    purge_running: std::sync::atomic::AtomicBool,
    live_epoch: RwLock<Option<u64>>,
}

fn encode_entry(entry: &NodeEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + entry.payload.len());
    out.extend_from_slice(&entry.refcount.to_be_bytes());
    out.extend_from_slice(&entry.payload);
    out
}

fn decode_entry(bytes: &[u8]) -> Option<NodeEntry> {
    if bytes.len() < 4 {
        return None;
    }
    let mut rc_bytes = [0u8; 4];
    rc_bytes.copy_from_slice(&bytes[0..4]);
    Some(NodeEntry {
        refcount: i32::from_be_bytes(rc_bytes),
        payload: bytes[4..].to_vec(),
    })
}

impl<S: KvStore> OverlayNodeStore<S> {
    pub fn new(backing: Arc<S>, archival: bool) -> Self {
        OverlayNodeStore {
            backing,
            archival,
            main: RwLock::new(HashMap::new()),
            pending_disk: RwLock::new(None),
            aux: RwLock::new(HashMap::new()),
            dead_candidates: RwLock::new(HashSet::new()),
            stop_signal: std::sync::atomic::AtomicBool::new(false),
            purge_running: std::sync::atomic::AtomicBool::new(false),
            live_epoch: RwLock::new(None),
        }
    }

    fn disk_entry(&self, hash: &Hash) -> Result<Option<NodeEntry>, StoreError> {
        Ok(self
            .backing
            .get(Column::State, hash.as_ref())?
            .and_then(|b| decode_entry(&b)))
    }

    /// Add or bump refcount (spec §4.2 `insert`).
    pub fn insert(&self, hash: Hash, bytes: Vec<u8>) {
        let mut main = self.main.write();
        main.entry(hash)
            .and_modify(|e| e.refcount += 1)
            .or_insert(NodeEntry { payload: bytes, refcount: 1 });
    }

    /// Decrement refcount to a floor of 0; physical removal deferred to
    /// `purge`. Killing a key absent from both the buffer and the backing
    /// store is a no-op in archival mode, an error otherwise (spec §3).
    pub fn kill(&self, hash: &Hash) -> Result<(), StoreError> {
        let mut main = self.main.write();
        if let Some(entry) = main.get_mut(hash) {
            entry.refcount = (entry.refcount - 1).max(0);
            return Ok(());
        }
        drop(main);
        match self.disk_entry(hash)? {
            Some(mut entry) => {
                entry.refcount = (entry.refcount - 1).max(0);
                self.main.write().insert(*hash, entry);
                Ok(())
            }
            None => {
                if self.archival {
                    Ok(())
                } else {
                    Err(StoreError::KillMissing)
                }
            }
        }
    }

    /// Cascades main-buffer -> backing store.
    pub fn lookup(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(entry) = self.main.read().get(hash) {
            return Ok(Some(entry.payload.clone()));
        }
        Ok(self.disk_entry(hash)?.map(|e| e.payload))
    }

    pub fn exists(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.lookup(hash)?.is_some())
    }

    pub fn insert_aux(&self, key: Vec<u8>, bytes: Vec<u8>) {
        self.aux.write().insert(key, AuxEntry { payload: bytes, live: true });
    }

    pub fn lookup_aux(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(entry) = self.aux.read().get(key) {
            return Ok(if entry.live { Some(entry.payload.clone()) } else { None });
        }
        Ok(self
            .backing
            .get(Column::Metadata, key)?
            .map(|v| v))
    }

    pub fn remove_aux(&self, key: &[u8]) {
        self.aux.write().entry(key.to_vec()).and_modify(|e| e.live = false).or_insert(AuxEntry {
            payload: Vec::new(),
            live: false,
        });
    }

    /// Flush the main buffer to the KV store as one batch; update
    /// durable refcounts additively; record `block_num` as the live-root
    /// epoch; queue newly-dead hashes for `purge`.
    pub fn commit(&self, block_num: u64) -> Result<(), StoreError> {
        let mut main = self.main.write();
        let mut ops = Vec::new();
        let mut newly_dead = Vec::new();

        for (hash, entry) in main.drain() {
            let existing = self.disk_entry(&hash)?;
            let merged_refcount = existing.map(|e| e.refcount).unwrap_or(0) + entry.refcount;
            let merged = NodeEntry {
                payload: entry.payload,
                refcount: merged_refcount.max(0),
            };
            if merged.refcount <= 0 {
                newly_dead.push(hash);
            }
            ops.push(WriteOp::Put(Column::State, hash.as_ref().to_vec(), encode_entry(&merged)));
        }

        let mut aux = self.aux.write();
        for (key, entry) in aux.drain() {
            if entry.live {
                ops.push(WriteOp::Put(Column::Metadata, key, entry.payload));
            } else {
                ops.push(WriteOp::Delete(Column::Metadata, key));
            }
        }

        self.backing.batch_write(ops)?;
        self.dead_candidates.write().extend(newly_dead);
        *self.live_epoch.write() = Some(block_num);
        *self.pending_disk.write() = None;
        Ok(())
    }

    /// Drop the main buffer without writing.
    pub fn rollback(&self) {
        self.main.write().clear();
        self.aux.write().clear();
    }

    /// One-deep snapshot of the main buffer (and aux) for contract-
    /// storage-style revertible writes.
    pub fn buffer_state(&self) {
        *self.pending_disk.write() = Some(self.main.read().clone());
    }

    /// Restore the last `buffer_state` snapshot, discarding everything
    /// written to `main` since.
    pub fn revert_state(&self) {
        if let Some(snapshot) = self.pending_disk.write().take() {
            *self.main.write() = snapshot;
        }
    }

    pub fn is_archival(&self) -> bool {
        self.archival
    }

    pub fn live_epoch(&self) -> Option<u64> {
        *self.live_epoch.read()
    }

    pub fn set_stop_signal(&self) {
        self.stop_signal.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_purge_running(&self) -> bool {
        self.purge_running.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Evict zero-refcount entries. In archival mode the rows are
    /// retained on disk but their hashes are still reported via
    /// `purged_out` (so callers can e.g. log what would have been
    /// collected); otherwise the rows are deleted.
    pub fn purge(&self, purged_out: &mut Vec<Hash>) -> Result<(), StoreError> {
        self.purge_running.store(true, std::sync::atomic::Ordering::SeqCst);
        self.stop_signal.store(false, std::sync::atomic::Ordering::SeqCst);

        let candidates: Vec<Hash> = self.dead_candidates.read().iter().cloned().collect();
        let mut ops = Vec::new();
        let mut still_dead = HashSet::new();

        for hash in candidates {
            if self.stop_signal.load(std::sync::atomic::Ordering::SeqCst) {
                // Cooperative abort: leave remaining candidates queued.
                still_dead.insert(hash);
                continue;
            }
            match self.disk_entry(&hash)? {
                Some(entry) if entry.refcount <= 0 => {
                    purged_out.push(hash);
                    if !self.archival {
                        ops.push(WriteOp::Delete(Column::State, hash.as_ref().to_vec()));
                    }
                }
                _ => {}
            }
        }

        let mut aux = self.aux.write();
        let dead_aux: Vec<Vec<u8>> = aux
            .iter()
            .filter(|(_, v)| !v.live)
            .map(|(k, _)| k.clone())
            .collect();
        for k in dead_aux {
            aux.remove(&k);
        }
        drop(aux);

        self.backing.batch_write(ops)?;
        *self.dead_candidates.write() = still_dead;
        self.purge_running.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKvStore;

    fn store() -> OverlayNodeStore<InMemoryKvStore> {
        OverlayNodeStore::new(Arc::new(InMemoryKvStore::new()), false)
    }

    #[test]
    fn insert_lookup_commit_roundtrip() {
        let s = store();
        let h = Hash::sha256(b"node");
        s.insert(h, b"payload".to_vec());
        assert_eq!(s.lookup(&h).unwrap(), Some(b"payload".to_vec()));
        s.commit(1).unwrap();
        assert_eq!(s.lookup(&h).unwrap(), Some(b"payload".to_vec()));
        assert_eq!(s.live_epoch(), Some(1));
    }

    #[test]
    fn rollback_drops_uncommitted_inserts() {
        let s = store();
        let h = Hash::sha256(b"node");
        s.insert(h, b"payload".to_vec());
        s.rollback();
        assert_eq!(s.lookup(&h).unwrap(), None);
    }

    #[test]
    fn full_cycle_purges_in_non_archival_mode() {
        let s = store();
        let h = Hash::sha256(b"node");
        s.insert(h, b"payload".to_vec());
        s.commit(1).unwrap();
        s.kill(&h).unwrap();
        s.commit(2).unwrap();

        let mut purged = Vec::new();
        s.purge(&mut purged).unwrap();
        assert_eq!(purged, vec![h]);
        assert!(!s.exists(&h).unwrap());
    }

    #[test]
    fn archival_mode_retains_purged_rows() {
        let s = OverlayNodeStore::new(Arc::new(InMemoryKvStore::new()), true);
        let h = Hash::sha256(b"node");
        s.insert(h, b"payload".to_vec());
        s.commit(1).unwrap();
        s.kill(&h).unwrap();
        s.commit(2).unwrap();

        let mut purged = Vec::new();
        s.purge(&mut purged).unwrap();
        assert_eq!(purged, vec![h]);
        assert!(s.exists(&h).unwrap());
    }

    #[test]
    fn kill_missing_errors_outside_archival() {
        let s = store();
        let h = Hash::sha256(b"missing");
        assert!(s.kill(&h).is_err());
    }

    #[test]
    fn buffer_state_revert_state_undo_writes() {
        let s = store();
        let h1 = Hash::sha256(b"one");
        s.insert(h1, b"1".to_vec());
        s.buffer_state();
        let h2 = Hash::sha256(b"two");
        s.insert(h2, b"2".to_vec());
        assert!(s.lookup(&h2).unwrap().is_some());
        s.revert_state();
        assert!(s.lookup(&h2).unwrap().is_none());
        assert!(s.lookup(&h1).unwrap().is_some());
    }
}
