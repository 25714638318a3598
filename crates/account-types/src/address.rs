//! 20-byte account addresses, derived from public keys or from
//! `(sender, nonce)` for contract creation — spec §3 "Address".

use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// `last-20-bytes(SHA-256(compressed_pubkey))`.
    pub fn from_public_key(compressed_pubkey: &[u8]) -> Self {
        let digest = Hash::sha256(compressed_pubkey);
        Self::last_20(digest.as_bytes())
    }

    /// `last-20-bytes(SHA-256(sender_address || nonce))`, `nonce` is the
    /// sender's nonce *at the time the creating transaction was submitted*
    /// (before it is bumped for this transaction).
    pub fn for_contract(sender: &Address, sender_nonce: u64) -> Self {
        let digest = Hash::sha256_concat(&[&sender.0, &sender_nonce.to_be_bytes()]);
        Self::last_20(digest.as_bytes())
    }

    fn last_20(digest: &[u8; 32]) -> Self {
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[12..32]);
        Address(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = &'static str;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        if slice.len() != ADDRESS_LEN {
            return Err("address must be exactly 20 bytes");
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(slice);
        Ok(Address(out))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_address_depends_on_nonce() {
        let sender = Address([7u8; ADDRESS_LEN]);
        let a0 = Address::for_contract(&sender, 0);
        let a1 = Address::for_contract(&sender, 1);
        assert_ne!(a0, a1);
    }

    #[test]
    fn pubkey_derivation_is_deterministic() {
        let pk = [1u8; 33];
        assert_eq!(Address::from_public_key(&pk), Address::from_public_key(&pk));
    }
}
