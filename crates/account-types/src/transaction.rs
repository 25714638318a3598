//! Transaction wire format and classification (spec §3 "Transaction",
//! §6 "Transaction on the wire").

use crate::address::{Address, ADDRESS_LEN};
use crate::hash::{Hash, HASH_LEN};
use serde::{Deserialize, Serialize};
use std::convert::{TryFrom, TryInto};

const PUBKEY_LEN: usize = 33;
const SIGNATURE_LEN: usize = 64;
/// Width of the big-endian padded integer fields on the wire
/// (`version`, `nonce`, `amount`, `gas_price`, `gas_limit`).
const WIRE_INT_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub nonce: u64,
    pub to_addr: Address,
    pub from_pubkey: [u8; PUBKEY_LEN],
    pub amount: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub signature: [u8; SIGNATURE_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnClass {
    NonContract,
    ContractCreation,
    ContractCall,
}

impl Transaction {
    /// The bytes covered by the signature and hashed into `tran_id`:
    /// every field except `tran_id` and `signature` themselves.
    pub fn core_fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            WIRE_INT_LEN * 3 + ADDRESS_LEN + PUBKEY_LEN + 8 + self.code.len() + self.data.len(),
        );
        out.extend_from_slice(&pad32(self.version as u128));
        out.extend_from_slice(&pad32(self.nonce as u128));
        out.extend_from_slice(self.to_addr.as_ref());
        out.extend_from_slice(&self.from_pubkey);
        out.extend_from_slice(&pad32(self.amount));
        out.extend_from_slice(&pad32(self.gas_price));
        out.extend_from_slice(&pad32(self.gas_limit as u128));
        out.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn tran_id(&self) -> Hash {
        Hash::sha256(&self.core_fields())
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.tran_id().as_ref());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.core_fields());
        out
    }

    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> Option<std::ops::Range<usize>> {
            if bytes.len() < *pos + n {
                return None;
            }
            let r = *pos..*pos + n;
            *pos += n;
            Some(r)
        };

        let _tran_id_range = take(&mut pos, HASH_LEN)?;
        let sig_range = take(&mut pos, SIGNATURE_LEN)?;
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[sig_range]);

        let version = u128::from_be_bytes(bytes[take(&mut pos, WIRE_INT_LEN)?].try_into().ok()?) as u32;
        let nonce = u128::from_be_bytes(bytes[take(&mut pos, WIRE_INT_LEN)?].try_into().ok()?) as u64;
        let to_addr = Address::try_from(&bytes[take(&mut pos, ADDRESS_LEN)?]).ok()?;
        let mut from_pubkey = [0u8; PUBKEY_LEN];
        from_pubkey.copy_from_slice(&bytes[take(&mut pos, PUBKEY_LEN)?]);
        let amount = u128::from_be_bytes(bytes[take(&mut pos, WIRE_INT_LEN)?].try_into().ok()?);
        let gas_price = u128::from_be_bytes(bytes[take(&mut pos, WIRE_INT_LEN)?].try_into().ok()?);
        let gas_limit = u128::from_be_bytes(bytes[take(&mut pos, WIRE_INT_LEN)?].try_into().ok()?) as u64;

        let code_len = u32::from_be_bytes(bytes[take(&mut pos, 4)?].try_into().ok()?) as usize;
        let code = bytes[take(&mut pos, code_len)?].to_vec();
        let data_len = u32::from_be_bytes(bytes[take(&mut pos, 4)?].try_into().ok()?) as usize;
        let data = bytes[take(&mut pos, data_len)?].to_vec();

        Some(Transaction {
            version,
            nonce,
            to_addr,
            from_pubkey,
            amount,
            gas_price,
            gas_limit,
            code,
            data,
            signature,
        })
    }

    /// Classification per spec §3: `NON_CONTRACT`, `CONTRACT_CREATION`,
    /// `CONTRACT_CALL`. `recipient_is_contract` is supplied by the caller
    /// (the evaluator, which has looked the recipient account up).
    pub fn classify(&self, recipient_is_contract: bool) -> Option<TxnClass> {
        if self.to_addr.is_zero() && !self.code.is_empty() {
            return Some(TxnClass::ContractCreation);
        }
        if !self.to_addr.is_zero() && recipient_is_contract && !self.data.is_empty() {
            return Some(TxnClass::ContractCall);
        }
        if !self.to_addr.is_zero() && self.code.is_empty() && !recipient_is_contract {
            return Some(TxnClass::NonContract);
        }
        None
    }

    pub fn gas_deposit(&self) -> u128 {
        self.gas_limit as u128 * self.gas_price
    }
}

fn pad32(v: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..32].copy_from_slice(&v.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            version: 1,
            nonce: 0,
            to_addr: Address([9u8; ADDRESS_LEN]),
            from_pubkey: [2u8; PUBKEY_LEN],
            amount: 30,
            gas_price: 1,
            gas_limit: 1,
            code: vec![],
            data: vec![],
            signature: [0u8; SIGNATURE_LEN],
        }
    }

    #[test]
    fn wire_round_trips() {
        let tx = sample();
        let wire = tx.to_wire();
        let decoded = Transaction::from_wire(&wire).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn tran_id_matches_wire_prefix() {
        let tx = sample();
        let wire = tx.to_wire();
        assert_eq!(&wire[0..HASH_LEN], tx.tran_id().as_ref());
    }

    #[test]
    fn classification() {
        let mut tx = sample();
        tx.to_addr = Address::ZERO;
        tx.code = vec![1, 2, 3];
        assert_eq!(tx.classify(false), Some(TxnClass::ContractCreation));

        let mut tx = sample();
        tx.code = vec![];
        tx.data = vec![];
        assert_eq!(tx.classify(false), Some(TxnClass::NonContract));

        let mut tx = sample();
        tx.data = vec![9];
        assert_eq!(tx.classify(true), Some(TxnClass::ContractCall));
    }
}
