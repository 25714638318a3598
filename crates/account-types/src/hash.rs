//! 32-byte hashes, used for trie node references, state roots and the
//! SHA-256 domain this engine hashes everything into (see spec §3).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::TryFrom;
use std::fmt;

pub const HASH_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// The all-zero sentinel used for "no storage root" / "no code" / an
    /// uninitialised `storage_root` awaiting lazy recomputation.
    pub const ZERO: Hash = Hash([0u8; HASH_LEN]);

    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn sha256_concat(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for p in parts {
            hasher.update(p);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = &'static str;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        if slice.len() != HASH_LEN {
            return Err("hash must be exactly 32 bytes");
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(slice);
        Ok(Hash(out))
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::sha256(b"x").is_zero());
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(Hash::sha256(b"hello"), Hash::sha256(b"hello"));
        assert_ne!(Hash::sha256(b"hello"), Hash::sha256(b"world"));
    }

    #[test]
    fn concat_matches_preimage() {
        let a = Hash::sha256_concat(&[b"foo", b"bar"]);
        let b = Hash::sha256(b"foobar");
        assert_eq!(a, b);
    }
}
