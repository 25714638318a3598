//! Trie node shapes and their serialization (spec §3 "Trie node").

use account_types::Hash;
use std::convert::{TryFrom, TryInto};

/// Either an inline serialized node (shorter than a hash) or a 32-byte
/// hash naming a node kept in the node store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    Inline(Vec<u8>),
    Hash(Hash),
}

impl ChildRef {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            ChildRef::Inline(bytes) => {
                out.push(1u8);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            ChildRef::Hash(h) => {
                out.push(2u8);
                out.extend_from_slice(h.as_ref());
            }
        }
        out
    }

    fn decode(bytes: &[u8], pos: &mut usize) -> Option<ChildRef> {
        let tag = *bytes.get(*pos)?;
        *pos += 1;
        match tag {
            1 => {
                let len = u16::from_be_bytes([*bytes.get(*pos)?, *bytes.get(*pos + 1)?]) as usize;
                *pos += 2;
                let inline = bytes.get(*pos..*pos + len)?.to_vec();
                *pos += len;
                Some(ChildRef::Inline(inline))
            }
            2 => {
                let h = Hash::try_from(bytes.get(*pos..*pos + 32)?).ok()?;
                *pos += 32;
                Some(ChildRef::Hash(h))
            }
            _ => None,
        }
    }

    /// Build a `ChildRef` from a node's own serialization, inlining it
    /// when that's shorter than a hash would be (spec §3).
    pub fn from_serialized(serialized: Vec<u8>) -> ChildRef {
        if serialized.len() < 32 {
            ChildRef::Inline(serialized)
        } else {
            ChildRef::Hash(Hash::sha256(&serialized))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    Leaf { compact_path: Vec<u8>, value: Vec<u8> },
    Extension { compact_path: Vec<u8>, child: ChildRef },
    Branch { children: Box<[Option<ChildRef>; 16]>, value: Option<Vec<u8>> },
}

const TAG_LEAF: u8 = 0;
const TAG_EXTENSION: u8 = 1;
const TAG_BRANCH: u8 = 2;

impl TrieNode {
    pub fn new_branch() -> TrieNode {
        TrieNode::Branch {
            children: Box::new(Default::default()),
            value: None,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TrieNode::Leaf { compact_path, value } => {
                out.push(TAG_LEAF);
                out.extend_from_slice(&(compact_path.len() as u16).to_be_bytes());
                out.extend_from_slice(compact_path);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value);
            }
            TrieNode::Extension { compact_path, child } => {
                out.push(TAG_EXTENSION);
                out.extend_from_slice(&(compact_path.len() as u16).to_be_bytes());
                out.extend_from_slice(compact_path);
                out.extend_from_slice(&child.encode());
            }
            TrieNode::Branch { children, value } => {
                out.push(TAG_BRANCH);
                for child in children.iter() {
                    match child {
                        None => out.push(0u8),
                        Some(c) => {
                            out.push(1u8);
                            out.extend_from_slice(&c.encode());
                        }
                    }
                }
                match value {
                    None => out.push(0u8),
                    Some(v) => {
                        out.push(1u8);
                        out.extend_from_slice(&(v.len() as u32).to_be_bytes());
                        out.extend_from_slice(v);
                    }
                }
            }
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Option<TrieNode> {
        let mut pos = 0usize;
        let tag = *bytes.get(pos)?;
        pos += 1;
        match tag {
            TAG_LEAF => {
                let path_len = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
                pos += 2;
                let compact_path = bytes.get(pos..pos + path_len)?.to_vec();
                pos += path_len;
                let value_len =
                    u32::from_be_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?) as usize;
                pos += 4;
                let value = bytes.get(pos..pos + value_len)?.to_vec();
                Some(TrieNode::Leaf { compact_path, value })
            }
            TAG_EXTENSION => {
                let path_len = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
                pos += 2;
                let compact_path = bytes.get(pos..pos + path_len)?.to_vec();
                pos += path_len;
                let child = ChildRef::decode(bytes, &mut pos)?;
                Some(TrieNode::Extension { compact_path, child })
            }
            TAG_BRANCH => {
                let mut children: Box<[Option<ChildRef>; 16]> = Box::new(Default::default());
                for slot in children.iter_mut() {
                    let present = *bytes.get(pos)?;
                    pos += 1;
                    if present == 1 {
                        *slot = Some(ChildRef::decode(bytes, &mut pos)?);
                    }
                }
                let has_value = *bytes.get(pos)?;
                pos += 1;
                let value = if has_value == 1 {
                    let value_len =
                        u32::from_be_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?) as usize;
                    pos += 4;
                    let v = bytes.get(pos..pos + value_len)?.to_vec();
                    Some(v)
                } else {
                    None
                };
                Some(TrieNode::Branch { children, value })
            }
            _ => None,
        }
    }
}
