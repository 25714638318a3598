//! The account record: the fixed 88-byte layout quoted into the trie and
//! persisted on the wire (spec §3 "Account record", §6 "Account record on
//! the wire / on disk").

use crate::hash::{Hash, HASH_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `balance(16) || nonce(8) || storage_root(32) || code_hash(32)`, all
/// integers big-endian. Total 88 bytes.
pub const ACCOUNT_RECORD_LEN: usize = 16 + 8 + HASH_LEN + HASH_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub balance: u128,
    pub nonce: u64,
    /// Zero for non-contract accounts, or a dirty sentinel (also zero)
    /// awaiting lazy recomputation — see `storage_root_dirty`.
    pub storage_root: Hash,
    /// Zero for non-contract accounts.
    pub code_hash: Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountError {
    InsufficientBalance,
    BalanceOverflow,
    NonceOverflow,
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountError::InsufficientBalance => write!(f, "insufficient balance"),
            AccountError::BalanceOverflow => write!(f, "balance overflow"),
            AccountError::NonceOverflow => write!(f, "nonce overflow"),
        }
    }
}
impl std::error::Error for AccountError {}

impl AccountRecord {
    pub fn new_default() -> Self {
        AccountRecord {
            balance: 0,
            nonce: 0,
            storage_root: Hash::ZERO,
            code_hash: Hash::ZERO,
        }
    }

    pub fn new_contract(code_hash: Hash, storage_root: Hash) -> Self {
        AccountRecord {
            balance: 0,
            nonce: 0,
            storage_root,
            code_hash,
        }
    }

    pub fn is_contract(&self) -> bool {
        !self.code_hash.is_zero()
    }

    /// `storage_root == ZERO` doubles as "dirty, recompute before quoting
    /// to the trie" per spec §3. Only meaningful for contract accounts;
    /// a non-contract account's zero root is simply "no storage".
    pub fn storage_root_dirty(&self) -> bool {
        self.is_contract() && self.storage_root.is_zero()
    }

    pub fn increase_balance(&mut self, delta: u128) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_add(delta)
            .ok_or(AccountError::BalanceOverflow)?;
        Ok(())
    }

    /// Returns `Ok(false)` rather than an error when the balance is
    /// insufficient, matching the evaluator's "debit and tell me if it
    /// worked" call sites; underflow on debit is never silently wrapped.
    pub fn decrease_balance(&mut self, delta: u128) -> bool {
        match self.balance.checked_sub(delta) {
            Some(remaining) => {
                self.balance = remaining;
                true
            }
            None => false,
        }
    }

    pub fn increase_nonce(&mut self) -> Result<(), AccountError> {
        self.nonce = self.nonce.checked_add(1).ok_or(AccountError::NonceOverflow)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; ACCOUNT_RECORD_LEN] {
        let mut out = [0u8; ACCOUNT_RECORD_LEN];
        out[0..16].copy_from_slice(&self.balance.to_be_bytes());
        out[16..24].copy_from_slice(&self.nonce.to_be_bytes());
        out[24..56].copy_from_slice(self.storage_root.as_ref());
        out[56..88].copy_from_slice(self.code_hash.as_ref());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ACCOUNT_RECORD_LEN {
            return None;
        }
        let mut balance_bytes = [0u8; 16];
        balance_bytes.copy_from_slice(&bytes[0..16]);
        let mut nonce_bytes = [0u8; 8];
        nonce_bytes.copy_from_slice(&bytes[16..24]);
        let mut storage_root = [0u8; HASH_LEN];
        storage_root.copy_from_slice(&bytes[24..56]);
        let mut code_hash = [0u8; HASH_LEN];
        code_hash.copy_from_slice(&bytes[56..88]);
        Some(AccountRecord {
            balance: u128::from_be_bytes(balance_bytes),
            nonce: u64::from_be_bytes(nonce_bytes),
            storage_root: Hash::from(storage_root),
            code_hash: Hash::from(code_hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let acc = AccountRecord {
            balance: 123_456_789_012_345,
            nonce: 42,
            storage_root: Hash::sha256(b"root"),
            code_hash: Hash::sha256(b"code"),
        };
        let bytes = acc.to_bytes();
        assert_eq!(bytes.len(), ACCOUNT_RECORD_LEN);
        assert_eq!(AccountRecord::from_bytes(&bytes), Some(acc));
    }

    #[test]
    fn decrease_balance_never_wraps() {
        let mut acc = AccountRecord::new_default();
        acc.balance = 5;
        assert!(!acc.decrease_balance(10));
        assert_eq!(acc.balance, 5);
        assert!(acc.decrease_balance(5));
        assert_eq!(acc.balance, 0);
    }

    #[test]
    fn is_contract_iff_code_hash_set() {
        let mut acc = AccountRecord::new_default();
        assert!(!acc.is_contract());
        acc.code_hash = Hash::sha256(b"code");
        assert!(acc.is_contract());
    }
}
