//! Decouples the evaluator from whatever concretely backs the account
//! set (the façade's trie-backed overlay, in production; a plain map in
//! tests) — the spec §9 "dynamic dispatch through inheritance" note
//! asks for a layered data structure instead of a class hierarchy, and
//! this trait boundary is where that layering happens for C7.

use account_types::{Address, AccountRecord};

pub trait AccountsView {
    fn get(&self, addr: &Address) -> Option<AccountRecord>;
    fn put(&mut self, addr: Address, account: AccountRecord);

    fn exists(&self, addr: &Address) -> bool {
        self.get(addr).is_some()
    }
}

/// Seeds a freshly created contract's code and init-data sidecars
/// (spec §4.4's non-Merkle-included sidecar pair).
pub trait ContractSetup {
    fn set_code(&mut self, addr: &Address, code: &[u8]) -> Result<(), String>;
    fn set_init_data(&mut self, addr: &Address, init_data: &[u8]) -> Result<(), String>;
}
