//! C4: per-contract composite-key sub-state, layered on a dedicated
//! `state-trie` rooted at the owning account's `storage_root`, plus a
//! code/init-data sidecar pair kept out of the Merkle tree (spec §4.4).

pub mod error;
pub mod query;

pub use error::StorageError;
pub use query::{Query, StateValue};

use account_types::{Address, Hash};
use kv_store::{Column, KvStore};
use node_store::OverlayNodeStore;
use query::{depth_key_for, RS};
use state_trie::Trie;
use std::collections::BTreeMap;
use std::convert::TryInto;
use std::sync::Arc;

/// A single account's sub-state trie plus the raw-key mirror that makes
/// subtree queries tractable: the trie keys every entry by
/// `SHA-256(composite_key)`, so it alone can't answer "list everything
/// under this prefix" — `entries` keeps the un-hashed composite keys
/// sorted for that purpose, and is kept in lock-step with the trie on
/// every write.
pub struct ContractStorage<S: KvStore> {
    backing: Arc<S>,
    trie: Trie<S>,
    address: Address,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    snapshot: Option<(Hash, BTreeMap<Vec<u8>, Vec<u8>>)>,
}

impl<S: KvStore> ContractStorage<S> {
    pub fn open(backing: Arc<S>, store: Arc<OverlayNodeStore<S>>, address: Address, storage_root: Hash) -> Result<Self, StorageError> {
        let trie = if storage_root == state_trie::empty_root() {
            Trie::new(store)
        } else {
            Trie::with_root(store, storage_root)?
        };
        Ok(ContractStorage {
            backing,
            trie,
            address,
            entries: BTreeMap::new(),
            snapshot: None,
        })
    }

    pub fn storage_root(&self) -> Hash {
        self.trie.root()
    }

    fn declared_depth(&self, field: &str) -> Option<usize> {
        let key = depth_key_for(&self.address, field);
        self.entries
            .get(&key)
            .map(|v| u32::from_be_bytes(v.as_slice().try_into().expect("depth record always 4 bytes")) as usize)
    }

    fn set_declared_depth(&mut self, field: &str, depth: usize) -> Result<(), StorageError> {
        let key = depth_key_for(&self.address, field);
        if self.declared_depth(field).is_none() {
            let bytes = (depth as u32).to_be_bytes().to_vec();
            self.entries.insert(key.clone(), bytes.clone());
            self.trie.insert(&key, bytes)?;
        }
        Ok(())
    }

    /// `fetch(address, query)`: exact leaf when the query reaches the
    /// field's declared depth, else the remaining subtree as a
    /// serialized nested map (spec §4.4).
    pub fn fetch(&self, query: &Query) -> Result<Option<Vec<u8>>, StorageError> {
        let declared = self.declared_depth(&query.field).unwrap_or(query.depth());
        if query.depth() >= declared {
            let key = query.composite_key(&self.address);
            return self.trie.get(&key).map_err(StorageError::from);
        }
        let prefix = query.composite_key(&self.address);
        Ok(self.reconstruct_subtree(&prefix).map(|v| v.to_bytes()))
    }

    fn reconstruct_subtree(&self, prefix: &[u8]) -> Option<StateValue> {
        let mut full_prefix = prefix.to_vec();
        full_prefix.push(RS);

        let mut map: BTreeMap<String, StateValue> = BTreeMap::new();
        let mut saw_anything = false;
        for (key, value) in self.entries.range(full_prefix.clone()..) {
            if !key.starts_with(&full_prefix) {
                break;
            }
            saw_anything = true;
            let remainder = &key[full_prefix.len()..];
            let next_idx = match remainder.iter().position(|&b| b == RS) {
                Some(p) => String::from_utf8_lossy(&remainder[..p]).to_string(),
                None => String::from_utf8_lossy(remainder).to_string(),
            };
            let has_more = remainder.iter().position(|&b| b == RS).is_some();
            if !has_more {
                map.entry(next_idx).or_insert_with(|| StateValue::Scalar(value.clone()));
            } else {
                map.entry(next_idx).or_insert_with(|| StateValue::Map(BTreeMap::new()));
            }
        }

        // Fill in nested maps recursively by re-running on each child prefix.
        let keys: Vec<String> = map.keys().cloned().collect();
        for k in keys {
            if let Some(StateValue::Map(_)) = map.get(&k) {
                let mut child_prefix = prefix.to_vec();
                child_prefix.push(RS);
                child_prefix.extend_from_slice(k.as_bytes());
                if let Some(sub) = self.reconstruct_subtree(&child_prefix) {
                    map.insert(k, sub);
                }
            }
        }

        if !saw_anything {
            // An empty scalar written directly at the map's own key
            // means "present but empty" (spec §4.4).
            if self.entries.contains_key(prefix) {
                return Some(StateValue::Map(BTreeMap::new()));
            }
            return None;
        }
        Some(StateValue::Map(map))
    }

    /// `update(address, query, value)` / with `ignore_val=true` deletes
    /// the reachable subtree instead (spec §4.4).
    pub fn update(&mut self, query: &Query, value: &[u8]) -> Result<(), StorageError> {
        if query.ignore_val {
            return self.delete_subtree(query);
        }

        let declared = self.declared_depth(&query.field).unwrap_or(query.depth());
        if query.depth() >= declared {
            self.set_declared_depth(&query.field, query.depth())?;
            let key = query.composite_key(&self.address);
            self.write_scalar(&key, value.to_vec())?;
            return Ok(());
        }

        // Splat: value is a serialized StateValue::Map; overwrite only
        // the reachable subtree, creating intermediate paths.
        let parsed = StateValue::from_bytes(value).ok_or(StorageError::MalformedValue)?;
        let prefix = query.composite_key(&self.address);
        self.delete_prefix(&prefix)?;
        self.splat(&prefix, &parsed)?;
        Ok(())
    }

    fn splat(&mut self, prefix: &[u8], value: &StateValue) -> Result<(), StorageError> {
        match value {
            StateValue::Scalar(bytes) => self.write_scalar(prefix, bytes.clone()),
            StateValue::Map(entries) => {
                if entries.is_empty() {
                    self.write_scalar(prefix, Vec::new())?;
                    return Ok(());
                }
                for (k, v) in entries {
                    let mut child = prefix.to_vec();
                    child.push(RS);
                    child.extend_from_slice(k.as_bytes());
                    self.splat(&child, v)?;
                }
                Ok(())
            }
        }
    }

    fn write_scalar(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.insert(key.to_vec(), value.clone());
        self.trie.insert(key, value)?;
        Ok(())
    }

    fn delete_subtree(&mut self, query: &Query) -> Result<(), StorageError> {
        let prefix = query.composite_key(&self.address);
        self.delete_prefix(&prefix)
    }

    fn delete_prefix(&mut self, prefix: &[u8]) -> Result<(), StorageError> {
        if self.entries.contains_key(prefix) {
            self.entries.remove(prefix);
            self.trie.delete(prefix)?;
        }
        let mut with_sep = prefix.to_vec();
        with_sep.push(RS);
        let matching: Vec<Vec<u8>> = self
            .entries
            .range(with_sep.clone()..)
            .take_while(|(k, _)| k.starts_with(&with_sep))
            .map(|(k, _)| k.clone())
            .collect();
        for k in matching {
            self.entries.remove(&k);
            self.trie.delete(&k)?;
        }
        Ok(())
    }

    /// Snapshot the temp diff one level deep so a failed inner call can
    /// be unwound without unwinding successful siblings (spec §4.4).
    pub fn buffer_current_state(&mut self) {
        self.snapshot = Some((self.trie.root(), self.entries.clone()));
    }

    pub fn revert_prev_state(&mut self) -> Result<(), StorageError> {
        if let Some((root, entries)) = self.snapshot.take() {
            self.trie.set_root(root)?;
            self.entries = entries;
        }
        Ok(())
    }

    // ---- code / init-data sidecars (not Merkle-included) -----------

    pub fn get_code(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.backing.get(Column::ContractCode, self.address.as_ref())?)
    }

    pub fn set_code(&self, code: &[u8]) -> Result<(), StorageError> {
        if self.get_code()?.is_some() {
            return Err(StorageError::CodeAlreadySet);
        }
        self.backing.put(Column::ContractCode, self.address.as_ref(), code)?;
        Ok(())
    }

    pub fn get_init_data(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.backing.get(Column::ContractInitData, self.address.as_ref())?)
    }

    pub fn set_init_data(&self, init_data: &[u8]) -> Result<(), StorageError> {
        self.backing.put(Column::ContractInitData, self.address.as_ref(), init_data)?;
        Ok(())
    }

    /// The raw-key mirror, for whole-contract snapshot transfer (spec
    /// §6 "snapshot wire format").
    pub fn export_entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Reinserts a previously exported raw-key mirror into both the
    /// trie and the in-memory index. Callers are expected to start from
    /// an empty-root `ContractStorage`.
    pub fn import_entries(&mut self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.entries.insert(key.clone(), value.clone());
            self.trie.insert(&key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKvStore;

    fn new_storage() -> ContractStorage<InMemoryKvStore> {
        let backing = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(OverlayNodeStore::new(backing.clone(), false));
        ContractStorage::open(backing, store, Address::ZERO, state_trie::empty_root()).unwrap()
    }

    #[test]
    fn scalar_fetch_update_roundtrip() {
        let mut cs = new_storage();
        let q = Query::new("balance", vec![]);
        cs.update(&q, b"100").unwrap();
        assert_eq!(cs.fetch(&q).unwrap(), Some(b"100".to_vec()));
    }

    #[test]
    fn nested_map_splat_and_subtree_fetch() {
        let mut cs = new_storage();
        let q = Query::new("balances", vec!["alice".to_string()]);
        cs.update(&q, b"100").unwrap();
        let q2 = Query::new("balances", vec!["bob".to_string()]);
        cs.update(&q2, b"200").unwrap();

        let whole = Query::new("balances", vec![]);
        let bytes = cs.fetch(&whole).unwrap().expect("subtree present");
        let parsed = StateValue::from_bytes(&bytes).unwrap();
        match parsed {
            StateValue::Map(m) => {
                assert_eq!(m.get("alice"), Some(&StateValue::Scalar(b"100".to_vec())));
                assert_eq!(m.get("bob"), Some(&StateValue::Scalar(b"200".to_vec())));
            }
            _ => panic!("expected map"),
        }
    }

    #[test]
    fn delete_with_ignore_val_removes_subtree() {
        let mut cs = new_storage();
        let q = Query::new("balances", vec!["alice".to_string()]);
        cs.update(&q, b"100").unwrap();
        let del = Query::delete("balances", vec!["alice".to_string()]);
        cs.update(&del, b"").unwrap();
        assert_eq!(cs.fetch(&q).unwrap(), None);
    }

    #[test]
    fn buffer_and_revert_undoes_writes() {
        let mut cs = new_storage();
        let q = Query::new("balance", vec![]);
        cs.update(&q, b"100").unwrap();
        cs.buffer_current_state();
        cs.update(&q, b"999").unwrap();
        assert_eq!(cs.fetch(&q).unwrap(), Some(b"999".to_vec()));
        cs.revert_prev_state().unwrap();
        assert_eq!(cs.fetch(&q).unwrap(), Some(b"100".to_vec()));
    }

    #[test]
    fn code_sidecar_rejects_double_set() {
        let cs = new_storage();
        cs.set_code(b"scilla-bytecode").unwrap();
        assert_eq!(cs.get_code().unwrap(), Some(b"scilla-bytecode".to_vec()));
        assert!(cs.set_code(b"other").is_err());
    }
}
