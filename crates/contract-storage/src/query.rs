//! Composite key construction and the nested-map value encoding for
//! contract sub-state (spec §3 "Contract sub-state", §4.4).

use std::convert::TryInto;

/// ASCII record-separator byte joining key segments, per spec §3.
pub const RS: u8 = 0x16;

/// Reserved field name recording how many index levels a field was
/// declared with, so a short query can be told apart from a mismatched
/// one (spec §4.4 "depth metadata per field").
const DEPTH_FIELD_PREFIX: &[u8] = b"\x00__depth__";

/// `(field_name, ordered map indices, ignore_val)` selecting a node in
/// a contract's sub-state tree (spec GLOSSARY "Query").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub field: String,
    pub indices: Vec<String>,
    pub ignore_val: bool,
}

impl Query {
    pub fn new(field: impl Into<String>, indices: Vec<String>) -> Query {
        Query { field: field.into(), indices, ignore_val: false }
    }

    pub fn delete(field: impl Into<String>, indices: Vec<String>) -> Query {
        Query { field: field.into(), indices, ignore_val: true }
    }

    /// Byte key for `address || field_name || RS || index1 || RS || ...`.
    pub fn composite_key(&self, address: &account_types::Address) -> Vec<u8> {
        build_key(address, &self.field, &self.indices)
    }

    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    /// Length-prefixed wire form carried over interpreter IPC query
    /// bytes (spec §4.6): field name, ordered indices, ignore_val flag.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.field.len() as u16).to_be_bytes());
        out.extend_from_slice(self.field.as_bytes());
        out.extend_from_slice(&(self.indices.len() as u16).to_be_bytes());
        for idx in &self.indices {
            out.extend_from_slice(&(idx.len() as u16).to_be_bytes());
            out.extend_from_slice(idx.as_bytes());
        }
        out.push(self.ignore_val as u8);
        out
    }

    pub fn from_wire(bytes: &[u8]) -> Option<Query> {
        let mut pos = 0usize;
        let flen = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
        pos += 2;
        let field = String::from_utf8(bytes.get(pos..pos + flen)?.to_vec()).ok()?;
        pos += flen;
        let nidx = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
        pos += 2;
        let mut indices = Vec::with_capacity(nidx);
        for _ in 0..nidx {
            let ilen = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
            pos += 2;
            let idx = String::from_utf8(bytes.get(pos..pos + ilen)?.to_vec()).ok()?;
            pos += ilen;
            indices.push(idx);
        }
        let ignore_val = *bytes.get(pos)? != 0;
        Some(Query { field, indices, ignore_val })
    }
}

fn build_key(address: &account_types::Address, field: &str, indices: &[String]) -> Vec<u8> {
    let mut out = address.as_ref().to_vec();
    out.extend_from_slice(field.as_bytes());
    for idx in indices {
        out.push(RS);
        out.extend_from_slice(idx.as_bytes());
    }
    out
}

pub(crate) fn depth_key_for(address: &account_types::Address, field: &str) -> Vec<u8> {
    let mut out = address.as_ref().to_vec();
    out.extend_from_slice(DEPTH_FIELD_PREFIX);
    out.push(RS);
    out.extend_from_slice(field.as_bytes());
    out
}

/// A scalar leaf or a nested map of further `StateValue`s; the unit of
/// `fetch`/`update`'s subtree splatting (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    Scalar(Vec<u8>),
    Map(std::collections::BTreeMap<String, StateValue>),
}

const TAG_SCALAR: u8 = 0;
const TAG_MAP: u8 = 1;

impl StateValue {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            StateValue::Scalar(bytes) => {
                out.push(TAG_SCALAR);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            StateValue::Map(entries) => {
                out.push(TAG_MAP);
                out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
                for (k, v) in entries {
                    out.extend_from_slice(&(k.len() as u16).to_be_bytes());
                    out.extend_from_slice(k.as_bytes());
                    v.write(out);
                }
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<StateValue> {
        let mut pos = 0usize;
        let v = Self::parse(bytes, &mut pos)?;
        Some(v)
    }

    fn parse(bytes: &[u8], pos: &mut usize) -> Option<StateValue> {
        let tag = *bytes.get(*pos)?;
        *pos += 1;
        match tag {
            TAG_SCALAR => {
                let len = u32::from_be_bytes(bytes.get(*pos..*pos + 4)?.try_into().ok()?) as usize;
                *pos += 4;
                let v = bytes.get(*pos..*pos + len)?.to_vec();
                *pos += len;
                Some(StateValue::Scalar(v))
            }
            TAG_MAP => {
                let count = u32::from_be_bytes(bytes.get(*pos..*pos + 4)?.try_into().ok()?) as usize;
                *pos += 4;
                let mut entries = std::collections::BTreeMap::new();
                for _ in 0..count {
                    let klen = u16::from_be_bytes([*bytes.get(*pos)?, *bytes.get(*pos + 1)?]) as usize;
                    *pos += 2;
                    let key = String::from_utf8(bytes.get(*pos..*pos + klen)?.to_vec()).ok()?;
                    *pos += klen;
                    let value = Self::parse(bytes, pos)?;
                    entries.insert(key, value);
                }
                Some(StateValue::Map(entries))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_value_roundtrips_nested() {
        let mut inner = std::collections::BTreeMap::new();
        inner.insert("a".to_string(), StateValue::Scalar(b"1".to_vec()));
        inner.insert("b".to_string(), StateValue::Map(std::collections::BTreeMap::new()));
        let v = StateValue::Map(inner);
        assert_eq!(StateValue::from_bytes(&v.to_bytes()), Some(v));
    }

    #[test]
    fn composite_key_separates_indices() {
        let addr = account_types::Address::ZERO;
        let q = Query::new("balances", vec!["alice".to_string(), "0".to_string()]);
        let key = q.composite_key(&addr);
        assert!(key.windows(1).any(|w| w[0] == RS));
    }

    #[test]
    fn query_wire_roundtrips() {
        let q = Query::delete("balances", vec!["alice".to_string(), "0".to_string()]);
        assert_eq!(Query::from_wire(&q.to_wire()), Some(q));
    }
}
