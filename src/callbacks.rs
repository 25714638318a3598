//! Serves the interpreter's callbacks (spec §4.6 table) for one
//! in-flight contract invocation. The original binds one IPC server per
//! currently-executing contract call, scoped to that call's contract
//! address; `EngineCallbacks` mirrors that by being constructed fresh
//! per call rather than shared across the whole façade (see
//! `AccountEngine::callbacks_for`).

use crate::PrimaryState;
use account_types::{AccountRecord, Address, Hash};
use contract_storage::{ContractStorage, Query};
use interpreter_ipc::{BlockchainInfo, Callbacks};
use kv_store::KvStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct EngineCallbacks<S: KvStore> {
    pub(crate) backing: Arc<S>,
    pub(crate) primary: Arc<RwLock<PrimaryState<S>>>,
    pub(crate) temp: Arc<Mutex<HashMap<Address, AccountRecord>>>,
    pub(crate) current_contract: Address,
    pub(crate) block_num: Arc<AtomicU64>,
    pub(crate) timestamp: Arc<AtomicU64>,
    pub(crate) chain_id: u32,
}

impl<S: KvStore + 'static> EngineCallbacks<S> {
    fn account_of(&self, addr: &Address) -> Option<AccountRecord> {
        if let Some(acc) = self.temp.lock().get(addr) {
            return Some(*acc);
        }
        let primary = self.primary.read();
        primary.trie.get(addr.as_ref()).ok().flatten().and_then(|b| AccountRecord::from_bytes(&b))
    }

    fn open_storage(&self, addr: Address) -> Result<ContractStorage<S>, String> {
        let account = self.account_of(&addr).ok_or_else(|| "no such account".to_string())?;
        let primary = self.primary.read();
        ContractStorage::open(self.backing.clone(), primary.node_store.clone(), addr, account.storage_root).map_err(|e| e.to_string())
    }

    /// The evaluator re-reads the account's `storage_root` via the
    /// `AccountsView` seam when it finishes the call, but an
    /// `updateStateValue` mid-call still needs to move the live
    /// `storage_root` into `temp` immediately so a *subsequent*
    /// `fetchStateValue` in the same call sees its own write.
    fn persist_storage_root(&self, addr: Address, storage: &ContractStorage<S>) {
        let mut temp = self.temp.lock();
        let mut account = temp.get(&addr).copied().or_else(|| self.account_of(&addr)).unwrap_or_else(AccountRecord::new_default);
        account.storage_root = storage.storage_root();
        temp.insert(addr, account);
    }
}

impl<S: KvStore + 'static> Callbacks for EngineCallbacks<S> {
    fn fetch_state_value(&self, query: &[u8]) -> (bool, Vec<u8>) {
        let query = match Query::from_wire(query) {
            Some(q) => q,
            None => return (false, Vec::new()),
        };
        match self.open_storage(self.current_contract).and_then(|s| s.fetch(&query).map_err(|e| e.to_string())) {
            Ok(Some(v)) => (true, v),
            _ => (false, Vec::new()),
        }
    }

    fn fetch_external_state_value(&self, target: Address, query: &[u8]) -> (bool, Vec<u8>, String) {
        let query = match Query::from_wire(query) {
            Some(q) => q,
            None => return (false, Vec::new(), String::new()),
        };
        match self.open_storage(target).and_then(|s| s.fetch(&query).map_err(|e| e.to_string())) {
            Ok(Some(v)) => (true, v, "ByStr".to_string()),
            _ => (false, Vec::new(), String::new()),
        }
    }

    fn update_state_value(&self, query: &[u8], value: &[u8]) {
        let query = match Query::from_wire(query) {
            Some(q) => q,
            None => return,
        };
        if let Ok(mut storage) = self.open_storage(self.current_contract) {
            if storage.update(&query, value).is_ok() {
                self.persist_storage_root(self.current_contract, &storage);
            }
        }
    }

    fn fetch_blockchain_info(&self, info: BlockchainInfo, _args: &str) -> String {
        match info {
            BlockchainInfo::BlockNumber => self.block_num.load(Ordering::SeqCst).to_string(),
            BlockchainInfo::Timestamp => self.timestamp.load(Ordering::SeqCst).to_string(),
            BlockchainInfo::BlockHash => format!("{:?}", Hash::ZERO),
            BlockchainInfo::ChainId => self.chain_id.to_string(),
        }
    }
}
